use super::{InvoiceData, InvoiceTotalsData};
use crate::dom::Document;
use crate::tlv::{self, Tag, TlvError};
use base64ct::{Base64, Encoding};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QrCodeError {
    #[error("seller legal name is missing")]
    MissingSellerName,
    #[error("seller VAT ID is missing")]
    MissingSellerVat,
    #[error(transparent)]
    Tlv(#[from] TlvError),
    #[error("QR code payload exceeds the allowed length once base64 encoded (len={len})")]
    EncodedTooLong { len: usize },
    #[error("{0} is missing from the invoice XML")]
    MissingField(&'static str),
    #[error("QR code payload is not valid base64")]
    InvalidBase64,
}

pub type QrResult<T> = std::result::Result<T, QrCodeError>;

/// Tag numbers of the QR payload records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QrTag {
    Seller = 1,
    TaxNumber = 2,
    InvoiceDate = 3,
    TotalAmount = 4,
    TaxAmount = 5,
    InvoiceHash = 6,
    Signature = 7,
    PublicKey = 8,
    CertSignature = 9,
}

impl QrTag {
    pub fn id(self) -> u8 {
        self as u8
    }
}

/// The facts a QR code carries, before TLV encoding.
#[derive(Debug, Clone)]
pub struct QrPayload {
    seller_name: String,
    seller_vat: String,
    timestamp: String,
    total: String,
    total_vat: String,
    simplified: bool,
    invoice_hash: Option<String>,
    signature: Option<String>,
    public_key: Option<Vec<u8>>,
    cert_signature: Option<Vec<u8>>,
}

impl QrPayload {
    pub(crate) fn from_invoice(
        invoice: &InvoiceData,
        totals: &InvoiceTotalsData,
    ) -> QrResult<Self> {
        Ok(Self {
            seller_name: invoice.seller_name()?.to_string(),
            seller_vat: invoice.seller_vat()?.to_string(),
            timestamp: format!(
                "{}T{}",
                invoice.issue_date_string(),
                invoice.issue_time_string()
            ),
            total: InvoiceData::format_amount(totals.tax_exclusive_amount()),
            total_vat: InvoiceData::format_amount(totals.tax_amount()),
            simplified: invoice.invoice_type().is_simplified(),
            invoice_hash: None,
            signature: None,
            public_key: None,
            cert_signature: None,
        })
    }

    /// Read the QR facts from an already generated invoice.
    pub(crate) fn from_document(doc: &Document) -> QrResult<Self> {
        let seller_name = text_at(
            doc,
            "//cac:AccountingSupplierParty//cac:PartyLegalEntity/cbc:RegistrationName",
        )
        .ok_or(QrCodeError::MissingSellerName)?;
        let seller_vat = text_at(
            doc,
            "//cac:AccountingSupplierParty//cac:PartyTaxScheme/cbc:CompanyID",
        )
        .ok_or(QrCodeError::MissingSellerVat)?;
        let issue_date =
            text_at(doc, "/*/cbc:IssueDate").ok_or(QrCodeError::MissingField("IssueDate"))?;
        let issue_time =
            text_at(doc, "/*/cbc:IssueTime").ok_or(QrCodeError::MissingField("IssueTime"))?;
        let total = text_at(doc, "//cac:LegalMonetaryTotal/cbc:TaxExclusiveAmount")
            .ok_or(QrCodeError::MissingField("TaxExclusiveAmount"))?;
        let total_vat = text_at(doc, "/*/cac:TaxTotal/cbc:TaxAmount")
            .ok_or(QrCodeError::MissingField("TaxAmount"))?;
        let simplified = doc
            .find("/*/cbc:InvoiceTypeCode")
            .and_then(|node| doc.attribute(node, "name"))
            .is_some_and(|name| name.starts_with("02"));

        Ok(Self {
            seller_name,
            seller_vat,
            timestamp: format!("{issue_date}T{}", issue_time.trim_end_matches('Z')),
            total,
            total_vat,
            simplified,
            invoice_hash: None,
            signature: None,
            public_key: None,
            cert_signature: None,
        })
    }

    pub(crate) fn with_signing_parts(
        mut self,
        invoice_hash: &str,
        signature: &str,
        public_key: &[u8],
        cert_signature: Option<&[u8]>,
    ) -> Self {
        self.invoice_hash = Some(invoice_hash.to_string());
        self.signature = Some(signature.to_string());
        self.public_key = Some(public_key.to_vec());
        self.cert_signature = cert_signature.map(<[u8]>::to_vec);
        self
    }

    pub(crate) fn is_simplified(&self) -> bool {
        self.simplified
    }

    /// Records in tag order. The certificate signature is only carried by
    /// simplified invoices.
    pub fn tags(&self) -> QrResult<Vec<Tag>> {
        let mut tags = vec![
            Tag::new(QrTag::Seller.id(), self.seller_name.as_bytes())?,
            Tag::new(QrTag::TaxNumber.id(), self.seller_vat.as_bytes())?,
            Tag::new(QrTag::InvoiceDate.id(), self.timestamp.as_bytes())?,
            Tag::new(QrTag::TotalAmount.id(), self.total.as_bytes())?,
            Tag::new(QrTag::TaxAmount.id(), self.total_vat.as_bytes())?,
        ];
        if let Some(hash) = &self.invoice_hash {
            tags.push(Tag::new(QrTag::InvoiceHash.id(), hash.as_bytes())?);
        }
        if let Some(signature) = &self.signature {
            tags.push(Tag::new(QrTag::Signature.id(), signature.as_bytes())?);
        }
        if let Some(public_key) = &self.public_key {
            tags.push(Tag::new(QrTag::PublicKey.id(), public_key.as_slice())?);
        }
        if self.simplified {
            if let Some(cert_signature) = &self.cert_signature {
                tags.push(Tag::new(QrTag::CertSignature.id(), cert_signature.as_slice())?);
            }
        }
        Ok(tags)
    }

    /// TLV-encode and base64 the payload.
    pub fn encode(&self, max_len: usize) -> QrResult<String> {
        let encoded = Base64::encode_string(&tlv::encode(&self.tags()?));
        debug!(len = encoded.len(), "encoded QR payload");
        if encoded.len() > max_len {
            return Err(QrCodeError::EncodedTooLong { len: encoded.len() });
        }
        Ok(encoded)
    }
}

/// Base64-decode a QR value and split it into records.
pub fn decode_qr(encoded: &str) -> QrResult<Vec<Tag>> {
    let bytes = Base64::decode_vec(encoded.trim()).map_err(|_| QrCodeError::InvalidBase64)?;
    Ok(tlv::decode(&bytes)?)
}

fn text_at(doc: &Document, path: &str) -> Option<String> {
    let value = doc.text_content(doc.find(path)?).trim().to_string();
    (!value.is_empty()).then_some(value)
}
