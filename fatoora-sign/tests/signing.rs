mod common;

use std::sync::Arc;

use fatoora_sign::certificate::Certificate;
use fatoora_sign::config::{Config, EnvironmentType, SigningTimeSource};
use fatoora_sign::dom::Document;
use fatoora_sign::invoice::sign::{InvoiceSigner, SigningErrorKind, invoice_digest};
use fatoora_sign::invoice::verify::verify;
use fatoora_sign::invoice::xml::ToXml;
use fatoora_sign::invoice::{
    InvoiceSubType, InvoiceType, OriginalInvoiceRef, QrTag, decode_qr,
};

#[test]
fn sign_invoice_emits_signature_and_qr() {
    common::init_tracing();
    let signed = common::simplified_invoice()
        .sign(&common::signer())
        .expect("sign invoice");
    let xml = signed.xml();
    assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"));
    assert!(xml.contains("<ds:SignatureValue>"));
    assert!(xml.contains("<cbc:ID>QR</cbc:ID>"));

    let mut doc = Document::parse(xml).expect("parse signed xml");
    doc.register_namespace(
        "cbc",
        "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2",
    );
    doc.register_namespace(
        "cac",
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2",
    );
    let qr = doc
        .find("//cac:AdditionalDocumentReference[cbc:ID='QR']/cac:Attachment/cbc:EmbeddedDocumentBinaryObject")
        .expect("missing QR node");
    assert_eq!(doc.text_content(qr).trim(), signed.qr_code());
}

#[test]
fn reconciliation_closes_the_digest_loop() {
    let signed = common::simplified_invoice()
        .sign(&common::signer())
        .expect("sign invoice");

    let recomputed = invoice_digest(&Document::parse(signed.xml()).expect("parse"));
    assert_eq!(recomputed, signed.invoice_hash());

    let tags = decode_qr(signed.qr_code()).expect("decode QR");
    let hash_tag = tags
        .iter()
        .find(|t| t.id() == QrTag::InvoiceHash.id())
        .expect("tag 6");
    assert_eq!(hash_tag.as_str(), Some(recomputed.as_str()));

    let verified = verify(signed.xml()).expect("verify");
    assert_eq!(verified.invoice_hash(), signed.invoice_hash());
}

#[test]
fn digest_is_deterministic_across_signings() {
    let signer = common::signer();
    let first = common::simplified_invoice().sign(&signer).expect("first");
    let second = common::simplified_invoice().sign(&signer).expect("second");
    assert_eq!(first.invoice_hash(), second.invoice_hash());
    assert_eq!(
        first.signed_properties().signed_props_hash(),
        second.signed_properties().signed_props_hash()
    );
}

#[test]
fn generated_xml_signs_the_same_as_the_model() {
    let invoice = common::simplified_invoice();
    let signer = common::signer();
    let from_model = invoice.sign(&signer).expect("sign model");
    let from_xml = signer
        .sign_xml(&invoice.to_xml().expect("xml"))
        .expect("sign xml");
    assert_eq!(from_model.invoice_hash(), from_xml.invoice_hash());
    assert_eq!(from_model.uuid(), from_xml.uuid());
    verify(from_xml.xml()).expect("verify signed xml");
}

#[test]
fn credit_note_signs_and_verifies() {
    let invoice = common::builder(
        InvoiceType::CreditNote(
            InvoiceSubType::Simplified,
            OriginalInvoiceRef::new("INV-42"),
            "Returned goods".into(),
        ),
        vec![common::line(-100.0)],
    )
    .invoice_level_discount(-5.0)
    .build()
    .expect("credit note");
    let signed = invoice.sign(&common::signer()).expect("sign credit note");
    assert!(signed.xml().contains("<cbc:ID>INV-42</cbc:ID>"));
    verify(signed.xml()).expect("verify credit note");
}

#[test]
fn standard_invoice_qr_has_no_certificate_signature() {
    let invoice = common::builder(
        InvoiceType::Tax(InvoiceSubType::Standard),
        vec![common::line(100.0)],
    )
    .build()
    .expect("standard invoice");
    let signed = invoice.sign(&common::signer()).expect("sign");
    let tags = decode_qr(signed.qr_code()).expect("decode QR");
    assert_eq!(tags.len(), 8);
    assert!(tags.iter().all(|t| t.id() != QrTag::CertSignature.id()));
}

#[test]
fn signing_without_private_key_fails() {
    let key = common::signing_key();
    let cert = Certificate::load(&common::certificate_pem(&key), "", "").expect("load cert");
    let signer = InvoiceSigner::new(Arc::new(cert), Config::default());
    let err = common::simplified_invoice()
        .sign(&signer)
        .expect_err("no key");
    assert_eq!(err.kind(), SigningErrorKind::SigningKeyUnavailable);
}

#[test]
fn indent_size_is_configurable() {
    let config = Config::new(EnvironmentType::Simulation)
        .with_indent_size(2)
        .with_signing_time_source(SigningTimeSource::IssueDateTime);
    let signer = InvoiceSigner::new(common::certificate(), config);
    let signed = common::simplified_invoice().sign(&signer).expect("sign");
    assert!(signed.xml().contains("\n  <cbc:ProfileID>"));
    verify(signed.xml()).expect("verify");
}

#[test]
fn qr_limit_is_enforced() {
    let config = Config::default().with_max_qr_length(64);
    let signer = InvoiceSigner::new(common::certificate(), config);
    let err = common::simplified_invoice()
        .sign(&signer)
        .expect_err("QR over limit");
    assert_eq!(err.kind(), SigningErrorKind::TlvEncoding);
}
