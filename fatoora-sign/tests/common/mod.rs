#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeZone;
use fatoora_sign::certificate::Certificate;
use fatoora_sign::config::Config;
use fatoora_sign::invoice::sign::InvoiceSigner;
use fatoora_sign::invoice::{
    Address, Buyer, FinalizedInvoice, InvoiceBuilder, InvoiceSubType, InvoiceType, LineItem,
    LineItemFields, OtherId, RequiredInvoiceFields, Seller, VatCategory,
};
use iso_currency::Currency;
use isocountry::CountryCode;
use k256::ecdsa::SigningKey;
use k256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use x509_cert::builder::{Builder, CertificateBuilder, Profile};
use x509_cert::der::EncodePem;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use x509_cert::time::Validity;

pub const SELLER_NAME: &str = "Acme SA";
pub const SELLER_VAT: &str = "300000000000003";
pub const ISSUER: &str = "CN=Fatoora Test CA,O=Fatoora,C=SA";

pub fn seller() -> Seller {
    Seller::new(
        SELLER_NAME.into(),
        Address::new(
            CountryCode::SAU,
            "Riyadh",
            "King Fahd",
            None,
            "1234",
            Some("5678".into()),
            "12222",
            None,
            Some("Olaya".into()),
        ),
        SELLER_VAT,
        Some(OtherId::with_scheme("7003339333", "CRN")),
    )
    .expect("valid seller")
}

pub fn buyer() -> Buyer {
    Buyer::new(
        "Buyer LLC".into(),
        Address::new(CountryCode::SAU, "Jeddah", "Tahlia", None, "4321", None, "23333", None, None),
        Some("311111111111113".into()),
        None,
    )
    .expect("valid buyer")
}

pub fn line(unit_price: f64) -> LineItem {
    LineItem::new(LineItemFields {
        description: "Item".into(),
        quantity: 1.0,
        unit_code: "PCE".into(),
        unit_price,
        vat_rate: 15.0,
        vat_category: VatCategory::Standard,
    })
}

pub fn builder(invoice_type: InvoiceType, line_items: Vec<LineItem>) -> InvoiceBuilder {
    let issued = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
        .expect("date")
        .and_hms_opt(12, 30, 0)
        .expect("time");
    InvoiceBuilder::new(RequiredInvoiceFields {
        invoice_type,
        id: "INV-1".into(),
        uuid: "8e6000cf-1a98-4174-b3e7-b5d5954bc10d".into(),
        issue_datetime: chrono::Utc.from_utc_datetime(&issued),
        currency: Currency::SAR,
        previous_invoice_hash: "NWZlY2ViNjZmZmM4NmYzOGQ5NTI3ODZjNmQ2OTZjNzljMmRiYzIzOWRkNGU5MWI0NjcyOWQ3M2EyN2ZiNTdlOQ==".into(),
        invoice_counter: 1,
        seller: seller(),
        line_items,
        payment_means_code: "10".into(),
        vat_category: VatCategory::Standard,
    })
    .buyer(buyer())
}

/// Simplified tax invoice, one line of 100.00 at 15%.
pub fn simplified_invoice() -> FinalizedInvoice {
    builder(InvoiceType::Tax(InvoiceSubType::Simplified), vec![line(100.0)])
        .build()
        .expect("build simplified invoice")
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[7u8; 32]).expect("signing key")
}

pub fn certificate_pem(key: &SigningKey) -> String {
    let spki_der = key.verifying_key().to_public_key_der().expect("public key der");
    let spki = SubjectPublicKeyInfoOwned::try_from(spki_der.as_bytes()).expect("spki");
    let builder = CertificateBuilder::new(
        Profile::Root,
        SerialNumber::new(&[0x0f, 0x42, 0x40]).expect("serial"),
        Validity::from_now(Duration::from_secs(3600)).expect("validity"),
        Name::from_str(ISSUER).expect("issuer"),
        spki,
        key,
    )
    .expect("builder");
    builder
        .build::<k256::ecdsa::DerSignature>()
        .expect("certificate")
        .to_pem(LineEnding::LF)
        .expect("certificate pem")
}

pub fn key_pem(key: &SigningKey) -> String {
    key.to_pkcs8_pem(LineEnding::LF).expect("key pem").to_string()
}

pub fn certificate() -> Arc<Certificate> {
    let key = signing_key();
    Arc::new(Certificate::load(&certificate_pem(&key), &key_pem(&key), "secret").expect("load"))
}

pub fn signer() -> InvoiceSigner {
    InvoiceSigner::new(certificate(), Config::default())
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
