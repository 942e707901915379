//! XAdES-enveloped signing of UBL invoices.
//!
//! The pipeline digests the generator output, signs the digest, splices the
//! signature block and QR reference into the text and re-indents it. Since
//! re-indentation changes whitespace the digest covers, the digest is then
//! recomputed from the final bytes and, if it moved, one corrective pass
//! re-signs and swaps the block and QR value in place.
pub mod signature;
mod splice;

use std::fmt;
use std::sync::Arc;

use base64ct::{Base64, Encoding};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::certificate::store::{CachedCertificates, CertificateSource};
use crate::certificate::{Certificate, CertificateLoadError, KeyError};
use crate::config::{Config, SigningTimeSource};
use crate::digest::sha256_base64;
use crate::dom::{C14nOptions, Document, XmlError};
use crate::invoice::xml::constants::PREFIXES;
use crate::invoice::xml::{InvoiceXmlError, ToXml, XmlFormat};
use crate::invoice::{FinalizedInvoice, QrCodeError, QrPayload, SignedInvoice};
use self::signature::{
    build_signature_xml, format_signing_time, signed_properties_digest, SignatureBlock,
};

/// Re-indentation step applied after each splice.
type Reformat<'a> = &'a dyn Fn(&str, usize) -> Result<String, XmlError>;

/// Where the pipeline was when something failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStage {
    Unsigned,
    Digested,
    Signed,
    Spliced,
    Reformatted,
    Verified,
    Reconciling,
    Spliced2,
    Reformatted2,
}

impl fmt::Display for SigningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningStage::Unsigned => "unsigned",
            SigningStage::Digested => "digested",
            SigningStage::Signed => "signed",
            SigningStage::Spliced => "spliced",
            SigningStage::Reformatted => "reformatted",
            SigningStage::Verified => "verified",
            SigningStage::Reconciling => "reconciling",
            SigningStage::Spliced2 => "spliced (corrective pass)",
            SigningStage::Reformatted2 => "reformatted (corrective pass)",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    CertificateLoad(#[from] CertificateLoadError),
    #[error("XML parse failed at stage {stage}: {source}")]
    XmlParse {
        stage: SigningStage,
        #[source]
        source: XmlError,
    },
    #[error("QR code encoding failed: {0}")]
    TlvEncoding(#[from] QrCodeError),
    #[error("digest mismatch after reconciliation (embedded={embedded}, recomputed={recomputed})")]
    DigestReconciliation {
        embedded: String,
        recomputed: String,
    },
    #[error("certificate has no private key")]
    SigningKeyUnavailable,
    #[error(transparent)]
    Generation(#[from] InvoiceXmlError),
    #[error("splice anchor {0} not found")]
    SpliceAnchorMissing(&'static str),
    #[error("splice pattern error: {0}")]
    Pattern(#[from] regex::Error),
    #[error("{0} is missing from the invoice XML")]
    MissingElement(&'static str),
    #[error("ECDSA signing failed: {0}")]
    Signature(String),
}

/// Flat discriminator over [`SigningError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningErrorKind {
    CertificateLoad,
    XmlParse,
    TlvEncoding,
    DigestReconciliation,
    SigningKeyUnavailable,
    Generation,
    Splice,
    Signature,
}

impl SigningError {
    pub fn kind(&self) -> SigningErrorKind {
        match self {
            SigningError::CertificateLoad(_) => SigningErrorKind::CertificateLoad,
            SigningError::XmlParse { .. } => SigningErrorKind::XmlParse,
            SigningError::TlvEncoding(_) => SigningErrorKind::TlvEncoding,
            SigningError::DigestReconciliation { .. } => SigningErrorKind::DigestReconciliation,
            SigningError::SigningKeyUnavailable => SigningErrorKind::SigningKeyUnavailable,
            SigningError::Generation(_) | SigningError::MissingElement(_) => {
                SigningErrorKind::Generation
            }
            SigningError::SpliceAnchorMissing(_) | SigningError::Pattern(_) => {
                SigningErrorKind::Splice
            }
            SigningError::Signature(_) => SigningErrorKind::Signature,
        }
    }
}

impl From<KeyError> for SigningError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Unavailable => SigningError::SigningKeyUnavailable,
            KeyError::InvalidDigest(reason) | KeyError::Ecdsa(reason) => {
                SigningError::Signature(reason)
            }
        }
    }
}

/// Everything that went into the signature of one invoice.
#[derive(Debug, Clone)]
pub struct SignedProperties {
    invoice_hash: String,
    signature: String,
    public_key: String,
    issuer: String,
    serial: String,
    cert_hash: String,
    signed_props_hash: String,
    signing_time: DateTime<Utc>,
    cert_signature: Option<String>,
}

impl SignedProperties {
    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Base64 of the DER SubjectPublicKeyInfo.
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }

    pub fn signed_props_hash(&self) -> &str {
        &self.signed_props_hash
    }

    pub fn signing_time(&self) -> DateTime<Utc> {
        self.signing_time
    }

    /// Base64 of the certificate signature, set for simplified invoices.
    pub fn cert_signature(&self) -> Option<&str> {
        self.cert_signature.as_deref()
    }
}

/// Signs invoices with one certificate.
///
/// # Examples
/// ```rust,no_run
/// use std::sync::Arc;
/// use fatoora_sign::certificate::Certificate;
/// use fatoora_sign::config::Config;
/// use fatoora_sign::invoice::FinalizedInvoice;
/// use fatoora_sign::invoice::sign::InvoiceSigner;
///
/// let cert_pem = std::fs::read_to_string("csid.pem")?;
/// let key_pem = std::fs::read_to_string("key.pem")?;
/// let certificate = Arc::new(Certificate::load(&cert_pem, &key_pem, "secret")?);
/// let signer = InvoiceSigner::new(certificate, Config::default());
///
/// let invoice: FinalizedInvoice = unimplemented!();
/// let signed = invoice.sign(&signer)?;
/// println!("{}", signed.invoice_hash());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceSigner {
    certificate: Arc<Certificate>,
    config: Config,
    signing_time: Option<DateTime<Utc>>,
}

impl InvoiceSigner {
    pub fn new(certificate: Arc<Certificate>, config: Config) -> Self {
        Self {
            certificate,
            config,
            signing_time: None,
        }
    }

    /// Signer for the certificate the store holds for the configured
    /// environment and class.
    ///
    /// # Errors
    /// [`SigningError::CertificateLoad`] if the store cannot produce it.
    pub fn from_store<S: CertificateSource>(
        store: &CachedCertificates<S>,
        config: Config,
    ) -> Result<Self, SigningError> {
        let certificate = store.get(config.env(), config.certificate_class())?;
        Ok(Self::new(certificate, config))
    }

    /// Fixed XAdES signing time, overriding [`Config::signing_time_source`].
    pub fn with_signing_time(mut self, signing_time: DateTime<Utc>) -> Self {
        self.signing_time = Some(signing_time);
        self
    }

    pub fn certificate(&self) -> &Arc<Certificate> {
        &self.certificate
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Generate, sign and embed the QR code of a built invoice.
    ///
    /// # Errors
    /// See [`SigningError`]; nothing partial is returned.
    pub fn sign(&self, invoice: &FinalizedInvoice) -> Result<SignedInvoice, SigningError> {
        self.sign_reformatted(invoice, &splice::reformat)
    }

    fn sign_reformatted(
        &self,
        invoice: &FinalizedInvoice,
        reformat: Reformat<'_>,
    ) -> Result<SignedInvoice, SigningError> {
        self.ensure_key()?;
        let xml = invoice.to_xml_with_format(XmlFormat::PrettyWith {
            indent_char: ' ',
            indent_size: self.config.indent_size(),
        })?;
        let doc = parse_at(&xml, SigningStage::Unsigned)?;
        let qr = QrPayload::from_invoice(invoice.data(), invoice.totals())?;
        let signing_time = self.signing_time_for(Some(*invoice.data().issue_datetime()));
        let uuid = invoice.data().uuid().to_string();
        self.run(&xml, &doc, qr, signing_time, uuid, reformat)
    }

    /// Sign UBL XML produced elsewhere. QR facts are read from the document.
    ///
    /// # Errors
    /// See [`SigningError`].
    pub fn sign_xml(&self, xml: &str) -> Result<SignedInvoice, SigningError> {
        self.ensure_key()?;
        let mut doc = parse_at(xml, SigningStage::Unsigned)?;
        register_prefixes(&mut doc);
        let qr = QrPayload::from_document(&doc)?;
        let uuid = doc
            .find("/*/cbc:UUID")
            .map(|node| doc.text_content(node).trim().to_string())
            .filter(|uuid| !uuid.is_empty())
            .ok_or(SigningError::MissingElement("cbc:UUID"))?;
        let signing_time = self.signing_time_for(issue_datetime(&doc));
        self.run(xml, &doc, qr, signing_time, uuid, &splice::reformat)
    }

    fn ensure_key(&self) -> Result<(), SigningError> {
        if self.certificate.has_private_key() {
            Ok(())
        } else {
            Err(SigningError::SigningKeyUnavailable)
        }
    }

    fn signing_time_for(&self, issued: Option<DateTime<Utc>>) -> DateTime<Utc> {
        if let Some(fixed) = self.signing_time {
            return fixed;
        }
        match (self.config.signing_time_source(), issued) {
            (SigningTimeSource::IssueDateTime, Some(issued)) => issued,
            _ => Utc::now(),
        }
    }

    fn run(
        &self,
        xml: &str,
        doc: &Document,
        qr: QrPayload,
        signing_time: DateTime<Utc>,
        uuid: String,
        reformat: Reformat<'_>,
    ) -> Result<SignedInvoice, SigningError> {
        let cert = &self.certificate;
        let simplified = qr.is_simplified();
        let indent = self.config.indent_size();
        let signing_time_text = format_signing_time(&signing_time);
        let cert_hash = cert.cert_digest();
        let signed_props_hash = signed_properties_digest(
            &signing_time_text,
            &cert_hash,
            cert.issuer_name(),
            cert.serial_number_decimal(),
        );

        let pass = |digest: &str| -> Result<(String, String, String), SigningError> {
            let signature = cert.sign_digest_base64(digest)?;
            let qr_code = qr
                .clone()
                .with_signing_parts(
                    digest,
                    &signature,
                    cert.public_key_raw(),
                    Some(cert.cert_signature_tail()),
                )
                .encode(self.config.max_qr_length())?;
            let block = build_signature_xml(
                SignatureBlock {
                    invoice_digest: digest,
                    signature_value: &signature,
                    signed_props_digest: &signed_props_hash,
                    signing_time: &signing_time_text,
                },
                cert,
                indent,
            )
            .map_err(|source| SigningError::XmlParse {
                stage: SigningStage::Signed,
                source,
            })?;
            Ok((signature, qr_code, block))
        };

        let mut digest = invoice_digest(doc);
        debug!(stage = %SigningStage::Digested, %digest, "invoice digested");
        let (mut signature, mut qr_code, block) = pass(&digest)?;
        debug!(stage = %SigningStage::Signed, qr_len = qr_code.len(), "digest signed");

        let spliced = splice::insert_signature_blocks(xml, &block, &qr_code)?;
        debug!(stage = %SigningStage::Spliced, "signature blocks inserted");
        let mut output = reformat_at(reformat, &spliced, indent, SigningStage::Reformatted)?;

        let recomputed = invoice_digest(&parse_at(&output, SigningStage::Reformatted)?);
        if recomputed != digest {
            info!(
                embedded = %digest,
                %recomputed,
                "digest moved after reformatting; running corrective pass"
            );
            debug!(stage = %SigningStage::Reconciling, "re-signing recomputed digest");
            let (new_signature, new_qr_code, new_block) = pass(&recomputed)?;
            let replaced = splice::replace_extensions(&output, &new_block)?;
            let replaced = splice::replace_qr_value(&replaced, &qr_code, &new_qr_code)?;
            debug!(stage = %SigningStage::Spliced2, "signature blocks replaced");
            output = reformat_at(reformat, &replaced, indent, SigningStage::Reformatted2)?;

            let verified = invoice_digest(&parse_at(&output, SigningStage::Reformatted2)?);
            if verified != recomputed {
                error!(
                    embedded = %recomputed,
                    recomputed = %verified,
                    "digest did not converge after the corrective pass"
                );
                return Err(SigningError::DigestReconciliation {
                    embedded: recomputed,
                    recomputed: verified,
                });
            }
            digest = recomputed;
            signature = new_signature;
            qr_code = new_qr_code;
        }
        debug!(stage = %SigningStage::Verified, %digest, "digest verified");
        info!(%uuid, invoice_hash = %digest, "invoice signed");

        let signed_properties = SignedProperties {
            invoice_hash: digest,
            signature,
            public_key: Base64::encode_string(cert.public_key_raw()),
            issuer: cert.issuer_name().to_string(),
            serial: cert.serial_number_decimal().to_string(),
            cert_hash,
            signed_props_hash,
            signing_time,
            cert_signature: simplified.then(|| Base64::encode_string(cert.cert_signature_tail())),
        };
        Ok(SignedInvoice::new(
            output,
            qr_code,
            uuid,
            signed_properties,
            Arc::clone(cert),
        ))
    }
}

/// `base64(SHA-256(C14N(invoice)))` with the signature block, the
/// `cac:Signature` placeholder and the QR reference removed.
///
/// # Examples
/// ```rust
/// use fatoora_sign::dom::Document;
/// use fatoora_sign::invoice::sign::invoice_digest;
///
/// let doc = Document::parse(r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2"/>"#)?;
/// assert_eq!(invoice_digest(&doc).len(), 44);
/// # Ok::<(), fatoora_sign::dom::XmlError>(())
/// ```
pub fn invoice_digest(doc: &Document) -> String {
    let mut stripped = doc.clone();
    register_prefixes(&mut stripped);
    stripped.remove_by_path("//ext:UBLExtensions");
    stripped.remove_by_path("//cac:Signature");
    stripped.remove_parent_by_path("//cac:AdditionalDocumentReference/cbc:ID[.='QR']");
    sha256_base64(stripped.canonicalize(&C14nOptions::inclusive()).as_bytes())
}

pub(crate) fn register_prefixes(doc: &mut Document) {
    for (prefix, uri) in PREFIXES {
        doc.register_namespace(prefix, uri);
    }
}

fn parse_at(xml: &str, stage: SigningStage) -> Result<Document, SigningError> {
    Document::parse(xml).map_err(|source| {
        error!(%stage, error = %source, "invoice XML failed to parse");
        SigningError::XmlParse { stage, source }
    })
}

fn reformat_at(
    reformat: Reformat<'_>,
    xml: &str,
    indent: usize,
    stage: SigningStage,
) -> Result<String, SigningError> {
    reformat(xml, indent).map_err(|source| {
        error!(%stage, error = %source, "spliced XML failed to parse");
        SigningError::XmlParse { stage, source }
    })
}

fn issue_datetime(doc: &Document) -> Option<DateTime<Utc>> {
    let date = doc.text_content(doc.find("/*/cbc:IssueDate")?);
    let time = doc.text_content(doc.find("/*/cbc:IssueTime")?);
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d").ok()?;
    let time = NaiveTime::parse_from_str(time.trim().trim_end_matches('Z'), "%H:%M:%S").ok()?;
    Some(date.and_time(time).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::test_support::{certificate, certificate_pem, signing_key};
    use crate::invoice::test_support::{build, simplified_invoice};
    use crate::invoice::{InvoiceSubType, InvoiceType};
    use std::cell::Cell;

    fn signer() -> InvoiceSigner {
        InvoiceSigner::new(Arc::new(certificate()), Config::default())
    }

    fn pad_before_root_close(xml: String, blank_lines: usize) -> String {
        let padding = "\n".repeat(blank_lines);
        xml.replacen("\n</Invoice>", &format!("{padding}\n</Invoice>"), 1)
    }

    #[test]
    fn digest_ignores_signature_regions() {
        let xml = simplified_invoice().to_xml().unwrap();
        let plain = invoice_digest(&Document::parse(&xml).unwrap());
        let spliced = splice::insert_signature_blocks(
            &xml,
            "<ext:UBLExtensions><ext:UBLExtension/></ext:UBLExtensions>",
            "UVI=",
        )
        .unwrap();
        let with_blocks = invoice_digest(&Document::parse(&spliced).unwrap());
        assert_eq!(plain, with_blocks);
        assert_eq!(plain.len(), 44);
    }

    #[test]
    fn signing_closes_the_digest_loop() {
        let signed = simplified_invoice().sign(&signer()).unwrap();
        let recomputed = invoice_digest(&Document::parse(signed.xml()).unwrap());
        assert_eq!(signed.invoice_hash(), recomputed);
        assert!(signed.xml().contains(&format!(
            "<ds:DigestValue>{recomputed}</ds:DigestValue>"
        )));
        assert!(signed.xml().contains(signed.qr_code()));
    }

    #[test]
    fn signing_time_defaults_to_issue_time() {
        let signed = simplified_invoice().sign(&signer()).unwrap();
        assert_eq!(
            format_signing_time(&signed.signed_properties().signing_time()),
            "2024-01-01T12:30:00"
        );
        let fixed = DateTime::parse_from_rfc3339("2025-02-03T04:05:06Z")
            .unwrap()
            .with_timezone(&Utc);
        let signed = simplified_invoice()
            .sign(&signer().with_signing_time(fixed))
            .unwrap();
        assert!(signed
            .xml()
            .contains("<xades:SigningTime>2025-02-03T04:05:06</xades:SigningTime>"));
    }

    #[test]
    fn missing_private_key_is_reported() {
        let cert = Certificate::load(&certificate_pem(&signing_key()), "", "").unwrap();
        let signer = InvoiceSigner::new(Arc::new(cert), Config::default());
        let err = simplified_invoice().sign(&signer).unwrap_err();
        assert_eq!(err.kind(), SigningErrorKind::SigningKeyUnavailable);
    }

    #[test]
    fn xml_without_anchors_fails_to_splice() {
        let xml = r#"<Invoice xmlns="urn:oasis:names:specification:ubl:schema:xsd:Invoice-2" xmlns:cbc="urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2" xmlns:cac="urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2">
    <cbc:UUID>u</cbc:UUID>
    <cbc:IssueDate>2024-01-01</cbc:IssueDate>
    <cbc:IssueTime>12:30:00</cbc:IssueTime>
    <cac:AccountingSupplierParty><cac:Party><cac:PartyTaxScheme><cbc:CompanyID>300000000000003</cbc:CompanyID></cac:PartyTaxScheme><cac:PartyLegalEntity><cbc:RegistrationName>Acme SA</cbc:RegistrationName></cac:PartyLegalEntity></cac:Party></cac:AccountingSupplierParty>
    <cac:TaxTotal><cbc:TaxAmount currencyID="SAR">15.00</cbc:TaxAmount></cac:TaxTotal>
    <cac:LegalMonetaryTotal><cbc:TaxExclusiveAmount currencyID="SAR">100.00</cbc:TaxExclusiveAmount></cac:LegalMonetaryTotal>
</Invoice>"#;
        let err = signer().sign_xml(xml).unwrap_err();
        assert!(matches!(err, SigningError::SpliceAnchorMissing("cbc:ProfileID")));
        assert_eq!(err.kind(), SigningErrorKind::Splice);
    }

    #[test]
    fn malformed_xml_carries_the_stage() {
        let err = signer().sign_xml("<Invoice>").unwrap_err();
        assert!(matches!(
            err,
            SigningError::XmlParse {
                stage: SigningStage::Unsigned,
                ..
            }
        ));
    }

    #[test]
    fn corrective_pass_converges_on_stable_formatting() {
        let invoice = simplified_invoice();
        let unsigned = invoice_digest(&Document::parse(&invoice.to_xml().unwrap()).unwrap());
        let calls = Cell::new(0);
        let reformat = |xml: &str, indent: usize| {
            calls.set(calls.get() + 1);
            splice::reformat(xml, indent).map(|out| pad_before_root_close(out, 1))
        };
        let signed = signer().sign_reformatted(&invoice, &reformat).unwrap();

        assert_eq!(calls.get(), 2);
        let recomputed = invoice_digest(&Document::parse(signed.xml()).unwrap());
        assert_eq!(signed.invoice_hash(), recomputed);
        assert_ne!(signed.invoice_hash(), unsigned);
        assert!(signed.xml().contains(&format!(
            "<ds:DigestValue>{recomputed}</ds:DigestValue>"
        )));
        assert!(signed.xml().contains(signed.qr_code()));
    }

    #[test]
    fn unstable_formatting_fails_reconciliation() {
        let calls = Cell::new(0);
        let reformat = |xml: &str, indent: usize| {
            calls.set(calls.get() + 1);
            splice::reformat(xml, indent).map(|out| pad_before_root_close(out, calls.get()))
        };
        let err = signer()
            .sign_reformatted(&simplified_invoice(), &reformat)
            .unwrap_err();

        assert_eq!(calls.get(), 2);
        assert_eq!(err.kind(), SigningErrorKind::DigestReconciliation);
        match err {
            SigningError::DigestReconciliation { embedded, recomputed } => {
                assert_ne!(embedded, recomputed);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn certificate_signature_is_recorded_for_simplified_invoices_only() {
        let simplified = simplified_invoice().sign(&signer()).unwrap();
        assert!(simplified.signed_properties().cert_signature().is_some());

        let standard = build(InvoiceType::Tax(InvoiceSubType::Standard))
            .sign(&signer())
            .unwrap();
        assert_eq!(standard.signed_properties().cert_signature(), None);
    }

    #[test]
    fn key_errors_map_to_signing_errors() {
        assert_eq!(
            SigningError::from(KeyError::Unavailable).kind(),
            SigningErrorKind::SigningKeyUnavailable
        );
        assert_eq!(
            SigningError::from(KeyError::InvalidDigest("bad".into())).kind(),
            SigningErrorKind::Signature
        );
    }
}
