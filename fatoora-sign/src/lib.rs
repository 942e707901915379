//! ZATCA phase 2 invoice signing: UBL generation, canonical digests, XAdES
//! signatures and TLV QR payloads.
//!
//! # Examples
//! ```rust
//! use fatoora_sign::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::NonProduction).with_indent_size(2);
//! assert_eq!(config.max_qr_length(), 700);
//! ```
pub mod certificate;
pub mod config;
pub mod digest;
pub mod dom;
pub mod invoice;
pub mod submission;
pub mod tlv;

use thiserror::Error;

/// Top-level error wrapper for crate operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Invoice(#[from] invoice::InvoiceError),
    #[error(transparent)]
    Signing(#[from] invoice::sign::SigningError),
    #[error(transparent)]
    Qr(#[from] invoice::QrCodeError),
    #[error(transparent)]
    Xml(#[from] invoice::xml::InvoiceXmlError),
    #[error(transparent)]
    Dom(#[from] dom::XmlError),
    #[error(transparent)]
    Tlv(#[from] tlv::TlvError),
    #[error(transparent)]
    Certificate(#[from] certificate::CertificateLoadError),
    #[error(transparent)]
    Verify(#[from] invoice::verify::VerifyError),
    #[error(transparent)]
    Environment(#[from] config::EnvironmentParseError),
}
