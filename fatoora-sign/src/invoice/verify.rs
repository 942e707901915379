//! Offline checks on signed invoices.
//!
//! [`verify`] re-derives everything the signer embedded: the invoice digest
//! from the final text, the SignedProperties digest from its template, the
//! QR records that mirror the signature, and the ECDSA signature against the
//! public key of the embedded certificate.
use base64ct::{Base64, Encoding};
use k256::ecdsa::signature::Verifier;
use k256::ecdsa::{Signature, VerifyingKey};
use k256::pkcs8::DecodePublicKey;
use thiserror::Error;
use tracing::{debug, warn};

use super::qr::{QrCodeError, QrTag, decode_qr};
use super::sign::signature::signed_properties_digest;
use super::sign::{invoice_digest, register_prefixes};
use crate::certificate::{Certificate, CertificateLoadError};
use crate::dom::{Document, XmlError};
use crate::tlv::Tag;

const INVOICE_DIGEST_PATH: &str =
    "//ds:SignedInfo/ds:Reference[@Id='invoiceSignedData']/ds:DigestValue";
const PROPERTIES_DIGEST_PATH: &str =
    "//ds:SignedInfo/ds:Reference[@URI='#xadesSignedProperties']/ds:DigestValue";
const QR_PATH: &str =
    "//cac:AdditionalDocumentReference[cbc:ID='QR']/cac:Attachment/cbc:EmbeddedDocumentBinaryObject";

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(transparent)]
    XmlParse(#[from] XmlError),
    #[error("{0} is missing from the signed invoice")]
    MissingElement(&'static str),
    #[error("embedded certificate could not be loaded: {0}")]
    Certificate(#[from] CertificateLoadError),
    #[error("QR code could not be decoded: {0}")]
    Qr(#[from] QrCodeError),
    #[error("{0} is not valid base64")]
    InvalidBase64(&'static str),
    #[error("invoice digest mismatch (embedded={embedded}, recomputed={recomputed})")]
    DigestMismatch {
        embedded: String,
        recomputed: String,
    },
    #[error("SignedProperties digest mismatch (embedded={embedded}, recomputed={recomputed})")]
    SignedPropertiesMismatch {
        embedded: String,
        recomputed: String,
    },
    #[error("QR tag {tag} does not match the signature block")]
    QrMismatch { tag: u8 },
    #[error("signing certificate details do not match the embedded certificate: {0}")]
    CertificateMismatch(&'static str),
    #[error("ECDSA signature does not verify: {0}")]
    BadSignature(String),
}

/// Signature values as they appear in a signed invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedXmlParts {
    pub uuid: Option<String>,
    pub invoice_digest: String,
    pub signed_properties_digest: String,
    pub signature_value: String,
    pub certificate: String,
    pub signing_time: String,
    pub cert_digest: String,
    pub issuer: String,
    pub serial: String,
    pub qr_code: String,
}

/// Outcome of a successful [`verify`].
#[derive(Debug, Clone)]
pub struct VerifiedInvoice {
    invoice_hash: String,
    uuid: Option<String>,
    signing_time: String,
    qr_tags: Vec<Tag>,
}

impl VerifiedInvoice {
    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn signing_time(&self) -> &str {
        &self.signing_time
    }

    pub fn qr_tags(&self) -> &[Tag] {
        &self.qr_tags
    }
}

/// Pull the signature values out of a signed invoice without checking them.
///
/// # Errors
/// [`VerifyError::XmlParse`] or [`VerifyError::MissingElement`].
pub fn inspect(xml: &str) -> Result<SignedXmlParts, VerifyError> {
    let mut doc = Document::parse(xml)?;
    register_prefixes(&mut doc);
    parts(&doc)
}

fn parts(doc: &Document) -> Result<SignedXmlParts, VerifyError> {
    let required = |path: &str, name: &'static str| {
        text_at(doc, path).ok_or(VerifyError::MissingElement(name))
    };
    Ok(SignedXmlParts {
        uuid: text_at(doc, "/*/cbc:UUID"),
        invoice_digest: required(INVOICE_DIGEST_PATH, "invoice DigestValue")?,
        signed_properties_digest: required(PROPERTIES_DIGEST_PATH, "SignedProperties DigestValue")?,
        signature_value: required("//ds:SignatureValue", "ds:SignatureValue")?,
        certificate: required("//ds:X509Certificate", "ds:X509Certificate")?,
        signing_time: required("//xades:SigningTime", "xades:SigningTime")?,
        cert_digest: required("//xades:CertDigest/ds:DigestValue", "xades:CertDigest")?,
        issuer: required("//xades:IssuerSerial/ds:X509IssuerName", "ds:X509IssuerName")?,
        serial: required("//xades:IssuerSerial/ds:X509SerialNumber", "ds:X509SerialNumber")?,
        qr_code: required(QR_PATH, "QR EmbeddedDocumentBinaryObject")?,
    })
}

/// Check a signed invoice end to end.
///
/// # Examples
/// ```rust,no_run
/// use fatoora_sign::invoice::verify::verify;
///
/// let xml = std::fs::read_to_string("signed.xml")?;
/// let verified = verify(&xml)?;
/// println!("{}", verified.invoice_hash());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Errors
/// The first check that fails, see [`VerifyError`].
pub fn verify(xml: &str) -> Result<VerifiedInvoice, VerifyError> {
    let mut doc = Document::parse(xml)?;
    register_prefixes(&mut doc);
    let parts = parts(&doc)?;

    let recomputed = invoice_digest(&doc);
    if recomputed != parts.invoice_digest {
        warn!(embedded = %parts.invoice_digest, %recomputed, "invoice digest mismatch");
        return Err(VerifyError::DigestMismatch {
            embedded: parts.invoice_digest,
            recomputed,
        });
    }

    let certificate = Certificate::load(&parts.certificate, "", "")?;
    if certificate.cert_digest() != parts.cert_digest {
        return Err(VerifyError::CertificateMismatch("CertDigest"));
    }
    if certificate.issuer_name() != parts.issuer {
        return Err(VerifyError::CertificateMismatch("X509IssuerName"));
    }
    if certificate.serial_number_decimal() != parts.serial {
        return Err(VerifyError::CertificateMismatch("X509SerialNumber"));
    }

    let props_digest = signed_properties_digest(
        &parts.signing_time,
        &parts.cert_digest,
        &parts.issuer,
        &parts.serial,
    );
    if props_digest != parts.signed_properties_digest {
        return Err(VerifyError::SignedPropertiesMismatch {
            embedded: parts.signed_properties_digest,
            recomputed: props_digest,
        });
    }

    let qr_tags = decode_qr(&parts.qr_code)?;
    check_qr(&qr_tags, QrTag::InvoiceHash, parts.invoice_digest.as_bytes())?;
    check_qr(&qr_tags, QrTag::Signature, parts.signature_value.as_bytes())?;
    check_qr(&qr_tags, QrTag::PublicKey, certificate.public_key_raw())?;

    verify_signature(&certificate, &parts.invoice_digest, &parts.signature_value)?;
    debug!(invoice_hash = %parts.invoice_digest, "signed invoice verified");

    Ok(VerifiedInvoice {
        invoice_hash: parts.invoice_digest,
        uuid: parts.uuid,
        signing_time: parts.signing_time,
        qr_tags,
    })
}

fn check_qr(tags: &[Tag], tag: QrTag, expected: &[u8]) -> Result<(), VerifyError> {
    match tags.iter().find(|t| t.id() == tag.id()) {
        Some(found) if found.value() == expected => Ok(()),
        _ => Err(VerifyError::QrMismatch { tag: tag.id() }),
    }
}

fn verify_signature(
    certificate: &Certificate,
    digest_b64: &str,
    signature_b64: &str,
) -> Result<(), VerifyError> {
    let key = VerifyingKey::from_public_key_der(certificate.public_key_raw())
        .map_err(|e| VerifyError::BadSignature(e.to_string()))?;
    let digest =
        Base64::decode_vec(digest_b64).map_err(|_| VerifyError::InvalidBase64("DigestValue"))?;
    let der = Base64::decode_vec(signature_b64)
        .map_err(|_| VerifyError::InvalidBase64("SignatureValue"))?;
    let signature = Signature::from_der(&der).map_err(|e| VerifyError::BadSignature(e.to_string()))?;
    key.verify(&digest, &signature)
        .map_err(|e| VerifyError::BadSignature(e.to_string()))
}

fn text_at(doc: &Document, path: &str) -> Option<String> {
    let value = doc.text_content(doc.find(path)?).trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::certificate;
    use crate::config::Config;
    use crate::digest::sha256_base64;
    use crate::invoice::sign::InvoiceSigner;
    use crate::invoice::test_support::simplified_invoice;
    use crate::invoice::SignedInvoice;
    use std::sync::Arc;

    fn signed() -> SignedInvoice {
        let signer = InvoiceSigner::new(Arc::new(certificate()), Config::default());
        simplified_invoice().sign(&signer).unwrap()
    }

    #[test]
    fn signed_invoice_verifies() {
        let signed = signed();
        let verified = verify(signed.xml()).unwrap();
        assert_eq!(verified.invoice_hash(), signed.invoice_hash());
        assert_eq!(verified.uuid(), Some("3cf5ee18-ee25-44ea-a444-2c37ba7f28be"));
        assert_eq!(verified.signing_time(), "2024-01-01T12:30:00");
        assert_eq!(verified.qr_tags().len(), 9);
    }

    #[test]
    fn inspect_reads_the_embedded_values() {
        let signed = signed();
        let parts = inspect(signed.xml()).unwrap();
        assert_eq!(parts.invoice_digest, signed.invoice_hash());
        assert_eq!(parts.signature_value, signed.signature());
        assert_eq!(parts.qr_code, signed.qr_code());
        assert_eq!(parts.issuer, signed.signed_properties().issuer());
        assert_eq!(parts.serial, signed.signed_properties().serial());
    }

    #[test]
    fn tampered_content_fails_the_digest_check() {
        let signed = signed();
        let tampered = signed
            .xml()
            .replacen("<cbc:ID>INV-1</cbc:ID>", "<cbc:ID>INV-2</cbc:ID>", 1);
        assert_ne!(tampered, signed.xml());
        assert!(matches!(
            verify(&tampered),
            Err(VerifyError::DigestMismatch { .. })
        ));
    }

    #[test]
    fn swapped_signature_fails_the_qr_check() {
        let signed = signed();
        let other = certificate()
            .sign_digest_base64(&sha256_base64(b"something else"))
            .unwrap();
        let tampered = signed.xml().replace(signed.signature(), &other);
        assert!(matches!(
            verify(&tampered),
            Err(VerifyError::QrMismatch { tag: 7 })
        ));
    }

    #[test]
    fn unsigned_xml_is_missing_elements() {
        let err = inspect(r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"/>"#)
            .unwrap_err();
        assert!(matches!(err, VerifyError::MissingElement("invoice DigestValue")));
    }
}
