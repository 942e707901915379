//! Invoice domain types, builder, XML generation and signing.
mod builder;
mod qr;
pub mod sign;
pub mod verify;
pub mod xml;
pub use builder::{FinalizedInvoice, InvoiceBuilder, RequiredInvoiceFields, SignedInvoice};
pub use qr::{QrCodeError, QrPayload, QrResult, QrTag, decode_qr};

use bitflags::bitflags;
use chrono::{DateTime, NaiveDate, Utc};
use iso_currency::Currency;
use isocountry::{CountryCode, CountryCodeParseErr};
use serde::{Deserialize, Serialize};
use std::marker::PhantomData;
use std::str::FromStr;
use thiserror::Error;

type Result<T> = std::result::Result<T, InvoiceError>;

/// Invoice-related errors.
#[derive(Debug, Error)]
pub enum InvoiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid country code: {0}")]
    InvalidCountryCode(#[from] CountryCodeParseErr),
    #[error("Missing Buyer ID for buyer")]
    MissingBuyerId,
    #[error("Invalid VAT ID format")]
    InvalidVatFormat,
}

/// Structured validation error with field-level issues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invoice validation failed with {} issue(s)", .issues.len())]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    pub fn has(&self, field: InvoiceField, kind: ValidationKind) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.field == field && issue.kind == kind)
    }
}

/// Single validation issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: InvoiceField,
    pub kind: ValidationKind,
    pub line_item_index: Option<usize>,
}

impl ValidationIssue {
    pub(crate) fn invoice(field: InvoiceField, kind: ValidationKind) -> Self {
        Self {
            field,
            kind,
            line_item_index: None,
        }
    }

    pub(crate) fn line(index: usize, field: InvoiceField, kind: ValidationKind) -> Self {
        Self {
            field,
            kind,
            line_item_index: Some(index),
        }
    }
}

#[non_exhaustive]
/// Field associated with a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceField {
    Id,
    Uuid,
    LineItems,
    PaymentMeansCode,
    Buyer,
    BillingReference,
    NoteReason,
    PayableAmount,
    LineItemDescription,
    LineItemUnitCode,
    LineItemQuantity,
    LineItemUnitPrice,
    LineItemTotalAmount,
    LineItemVatRate,
    LineItemVatAmount,
}

#[non_exhaustive]
/// Classification of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Missing,
    Empty,
    InvalidFormat,
    OutOfRange,
    Mismatch,
}

/// Postal address for parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country_code: CountryCode,
    pub city: String,
    pub street: String,
    pub additional_street: Option<String>,
    pub building_number: String,
    pub additional_number: Option<String>,
    pub postal_code: String,
    pub subdivision: Option<String>,
    pub district: Option<String>,
}

impl Address {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        country_code: CountryCode,
        city: impl Into<String>,
        street: impl Into<String>,
        additional_street: Option<String>,
        building_number: impl Into<String>,
        additional_number: Option<String>,
        postal_code: impl Into<String>,
        subdivision: Option<String>,
        district: Option<String>,
    ) -> Self {
        Self {
            country_code,
            city: city.into(),
            street: street.into(),
            additional_street,
            building_number: building_number.into(),
            additional_number,
            postal_code: postal_code.into(),
            subdivision,
            district,
        }
    }

    /// Address with a country given as an ISO alpha-2 or alpha-3 code.
    ///
    /// # Errors
    /// Returns [`InvoiceError::InvalidCountryCode`] for unknown codes.
    pub fn with_country_str(
        country: &str,
        city: impl Into<String>,
        street: impl Into<String>,
        building_number: impl Into<String>,
        postal_code: impl Into<String>,
    ) -> Result<Self> {
        let country = country.trim();
        let country_code = match CountryCode::for_alpha2(country) {
            Ok(code) => code,
            Err(_) => CountryCode::for_alpha3(country)?,
        };
        Ok(Self::new(
            country_code,
            city,
            street,
            None,
            building_number,
            None,
            postal_code,
            None,
            None,
        ))
    }

    pub fn country_code(&self) -> &CountryCode {
        &self.country_code
    }

    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn street(&self) -> &str {
        &self.street
    }

    pub fn additional_street(&self) -> Option<&str> {
        self.additional_street.as_deref()
    }

    pub fn building_number(&self) -> &str {
        &self.building_number
    }

    pub fn additional_number(&self) -> Option<&str> {
        self.additional_number.as_deref()
    }

    pub fn postal_code(&self) -> &str {
        &self.postal_code
    }

    pub fn subdivision(&self) -> Option<&str> {
        self.subdivision.as_deref()
    }

    pub fn district(&self) -> Option<&str> {
        self.district.as_deref()
    }
}

/// VAT registration number.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::VatId;
///
/// let vat = VatId::parse("300000000000003")?;
/// assert_eq!(vat.as_str(), "300000000000003");
/// # Ok::<(), fatoora_sign::invoice::InvoiceError>(())
/// ```
///
/// # Errors
/// Returns [`InvoiceError::InvalidVatFormat`] if the input is empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatId(String);
impl VatId {
    pub fn parse<S: Into<String>>(s: S) -> Result<Self> {
        let s = s.into().trim().to_string();
        if s.is_empty() {
            return Err(InvoiceError::InvalidVatFormat);
        }
        Ok(VatId(s))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl AsRef<str> for VatId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
impl FromStr for VatId {
    type Err = InvoiceError;
    fn from_str(s: &str) -> Result<Self> {
        VatId::parse(s)
    }
}
impl TryFrom<&str> for VatId {
    type Error = InvoiceError;
    fn try_from(value: &str) -> Result<Self> {
        VatId::parse(value)
    }
}

/// Additional party identifier such as a commercial registration number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtherId {
    value: String,
    scheme_id: Option<String>,
}
impl OtherId {
    pub fn new<S: Into<String>>(value: S) -> Self {
        OtherId {
            value: value.into(),
            scheme_id: None,
        }
    }

    pub fn with_scheme<V: Into<String>, S: Into<String>>(value: V, scheme_id: S) -> Self {
        OtherId {
            value: value.into(),
            scheme_id: Some(scheme_id.into()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn scheme_id(&self) -> Option<&str> {
        self.scheme_id.as_deref()
    }
}

/// Invoice note with language metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNote {
    language: String,
    text: String,
}

impl InvoiceNote {
    pub fn new(language: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            text: text.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Marker trait for party role types.
pub trait PartyRole {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerRole;
impl PartyRole for SellerRole {}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerRole;
impl PartyRole for BuyerRole {}

/// Party wrapper with role-specific construction rules.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::{Address, Party, SellerRole};
/// use isocountry::CountryCode;
///
/// let seller = Party::<SellerRole>::new(
///     "Acme SA".into(),
///     Address::new(CountryCode::SAU, "Riyadh", "King Fahd", None, "1234", None, "12222", None, None),
///     "300000000000003",
///     None,
/// )?;
/// assert_eq!(seller.name(), "Acme SA");
/// # Ok::<(), fatoora_sign::invoice::InvoiceError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party<R: PartyRole> {
    _marker: PhantomData<R>,
    name: String,
    address: Address,
    vat_id: Option<VatId>,
    other_id: Option<OtherId>,
}

pub type Seller = Party<SellerRole>;
pub type Buyer = Party<BuyerRole>;

impl Party<SellerRole> {
    /// Create a seller; the VAT number is required.
    ///
    /// # Errors
    /// Returns an error if the VAT ID is invalid.
    pub fn new(
        name: String,
        address: Address,
        vat_id: impl Into<String>,
        other_id: Option<OtherId>,
    ) -> Result<Self> {
        let vat = VatId::parse(vat_id.into())?;
        Ok(Party {
            _marker: PhantomData,
            name,
            address,
            vat_id: Some(vat),
            other_id,
        })
    }
}

impl Party<BuyerRole> {
    /// Create a buyer identified by VAT number or another id.
    ///
    /// # Errors
    /// Returns an error if the VAT ID is invalid or no identifier is provided.
    pub fn new(
        name: String,
        address: Address,
        vat_id: Option<String>,
        other_id: Option<OtherId>,
    ) -> Result<Self> {
        let vat = match vat_id {
            Some(v) => Some(VatId::parse(v)?),
            None => None,
        };
        if vat.is_none() && other_id.is_none() {
            return Err(InvoiceError::MissingBuyerId);
        }
        Ok(Party {
            _marker: PhantomData,
            name,
            address,
            vat_id: vat,
            other_id,
        })
    }
}

impl<R: PartyRole> Party<R> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn vat_id(&self) -> Option<&VatId> {
        self.vat_id.as_ref()
    }

    pub fn other_id(&self) -> Option<&OtherId> {
        self.other_id.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceSubType {
    Simplified,
    Standard,
}

/// Reference to an original invoice for credit/debit notes.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::OriginalInvoiceRef;
///
/// let original = OriginalInvoiceRef::new("INV-42").with_uuid("uuid-orig");
/// assert_eq!(original.id(), "INV-42");
/// assert_eq!(original.uuid(), Some("uuid-orig"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginalInvoiceRef {
    id: String,
    uuid: Option<String>,
    issue_date: Option<NaiveDate>,
}

impl OriginalInvoiceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uuid: None,
            issue_date: None,
        }
    }

    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn with_issue_date(mut self, issue_date: NaiveDate) -> Self {
        self.issue_date = Some(issue_date);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }
}

/// Invoice type. Notes carry the original invoice and the reason.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::{InvoiceSubType, InvoiceType};
///
/// let invoice_type = InvoiceType::Tax(InvoiceSubType::Simplified);
/// assert!(invoice_type.is_simplified());
/// assert_eq!(invoice_type.type_code(), "388");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceType {
    Tax(InvoiceSubType),
    Prepayment(InvoiceSubType),
    CreditNote(InvoiceSubType, OriginalInvoiceRef, String),
    DebitNote(InvoiceSubType, OriginalInvoiceRef, String),
}

impl InvoiceType {
    pub fn sub_type(&self) -> InvoiceSubType {
        match self {
            InvoiceType::Tax(st)
            | InvoiceType::Prepayment(st)
            | InvoiceType::CreditNote(st, ..)
            | InvoiceType::DebitNote(st, ..) => *st,
        }
    }

    pub fn is_simplified(&self) -> bool {
        self.sub_type() == InvoiceSubType::Simplified
    }

    pub fn is_credit_note(&self) -> bool {
        matches!(self, InvoiceType::CreditNote(..))
    }

    /// UN/CEFACT 1001 document code.
    pub fn type_code(&self) -> &'static str {
        match self {
            InvoiceType::Tax(_) => "388",
            InvoiceType::Prepayment(_) => "386",
            InvoiceType::CreditNote(..) => "381",
            InvoiceType::DebitNote(..) => "383",
        }
    }

    pub fn original_invoice(&self) -> Option<&OriginalInvoiceRef> {
        match self {
            InvoiceType::CreditNote(_, original, _) | InvoiceType::DebitNote(_, original, _) => {
                Some(original)
            }
            _ => None,
        }
    }

    pub fn note_reason(&self) -> Option<&str> {
        match self {
            InvoiceType::CreditNote(_, _, reason) | InvoiceType::DebitNote(_, _, reason) => {
                Some(reason.as_str())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VatCategory {
    Exempt,
    Standard,
    Zero,
    OutOfScope,
}

impl VatCategory {
    /// UN/ECE 5305 code.
    pub fn code(&self) -> &'static str {
        match self {
            VatCategory::Exempt => "E",
            VatCategory::Standard => "S",
            VatCategory::Zero => "Z",
            VatCategory::OutOfScope => "O",
        }
    }
}

/// Single invoice line item.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::{LineItem, LineItemFields, VatCategory};
///
/// let item = LineItem::new(LineItemFields {
///     description: "Item".into(),
///     quantity: 2.0,
///     unit_code: "PCE".into(),
///     unit_price: 50.0,
///     vat_rate: 15.0,
///     vat_category: VatCategory::Standard,
/// });
/// assert_eq!(item.total_amount(), 100.0);
/// assert_eq!(item.vat_amount(), 15.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    description: String,
    quantity: f64,
    unit_code: String,
    unit_price: f64,
    total_amount: f64,
    vat_rate: f64,
    vat_amount: f64,
    vat_category: VatCategory,
}

/// Fields for creating a line item with computed totals.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemFields {
    pub description: String,
    pub quantity: f64,
    pub unit_code: String,
    pub unit_price: f64,
    pub vat_rate: f64,
    pub vat_category: VatCategory,
}

/// Fields for creating a line item with a provided net total.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemTotalsFields {
    pub description: String,
    pub quantity: f64,
    pub unit_code: String,
    pub unit_price: f64,
    pub total_amount: f64,
    pub vat_rate: f64,
    pub vat_category: VatCategory,
}

/// Fields for creating a line item from fully specified parts.
#[derive(Debug, Clone, PartialEq)]
pub struct LineItemPartsFields {
    pub description: String,
    pub quantity: f64,
    pub unit_code: String,
    pub unit_price: f64,
    pub total_amount: f64,
    pub vat_rate: f64,
    pub vat_amount: f64,
    pub vat_category: VatCategory,
}

impl LineItem {
    pub fn new(fields: LineItemFields) -> Self {
        let total_amount = round2(fields.quantity * fields.unit_price);
        let vat_amount = Self::calculate_vat_amount(total_amount, fields.vat_rate);
        Self {
            description: fields.description,
            quantity: fields.quantity,
            unit_code: fields.unit_code,
            unit_price: fields.unit_price,
            total_amount,
            vat_rate: fields.vat_rate,
            vat_amount,
            vat_category: fields.vat_category,
        }
    }

    pub fn from_totals(fields: LineItemTotalsFields) -> Self {
        let vat_amount = Self::calculate_vat_amount(fields.total_amount, fields.vat_rate);
        Self {
            description: fields.description,
            quantity: fields.quantity,
            unit_code: fields.unit_code,
            unit_price: fields.unit_price,
            total_amount: fields.total_amount,
            vat_rate: fields.vat_rate,
            vat_amount,
            vat_category: fields.vat_category,
        }
    }

    /// Create a line item from fully specified amounts.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if totals do not match computed values.
    pub fn try_from_parts(
        fields: LineItemPartsFields,
    ) -> std::result::Result<Self, ValidationError> {
        const EPSILON: f64 = 0.01;
        let expected_total = fields.quantity * fields.unit_price;
        let expected_vat = Self::calculate_vat_amount(fields.total_amount, fields.vat_rate);

        let mut issues = Vec::new();
        if (expected_total - fields.total_amount).abs() > EPSILON {
            issues.push(ValidationIssue::invoice(
                InvoiceField::LineItemTotalAmount,
                ValidationKind::Mismatch,
            ));
        }
        if (expected_vat - fields.vat_amount).abs() > EPSILON {
            issues.push(ValidationIssue::invoice(
                InvoiceField::LineItemVatAmount,
                ValidationKind::Mismatch,
            ));
        }
        if !issues.is_empty() {
            return Err(ValidationError::new(issues));
        }

        Ok(Self {
            description: fields.description,
            quantity: fields.quantity,
            unit_code: fields.unit_code,
            unit_price: fields.unit_price,
            total_amount: fields.total_amount,
            vat_rate: fields.vat_rate,
            vat_amount: fields.vat_amount,
            vat_category: fields.vat_category,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn unit_code(&self) -> &str {
        &self.unit_code
    }

    pub fn unit_price(&self) -> f64 {
        self.unit_price
    }

    pub fn total_amount(&self) -> f64 {
        self.total_amount
    }

    pub fn vat_rate(&self) -> f64 {
        self.vat_rate
    }

    pub fn vat_amount(&self) -> f64 {
        self.vat_amount
    }

    pub fn vat_category(&self) -> VatCategory {
        self.vat_category
    }

    /// Refund orders carry negative amounts; a credit note states them
    /// positively.
    pub(crate) fn into_absolute(mut self) -> Self {
        self.quantity = self.quantity.abs();
        self.unit_price = self.unit_price.abs();
        self.total_amount = self.total_amount.abs();
        self.vat_amount = self.vat_amount.abs();
        self
    }

    fn calculate_vat_amount(total_amount: f64, vat_rate: f64) -> f64 {
        round2(total_amount * (vat_rate / 100.0))
    }
}

pub type LineItems = Vec<LineItem>;

/// Document-level allowance (discount) or charge.
///
/// # Examples
/// ```rust
/// use fatoora_sign::invoice::{AllowanceCharge, VatCategory};
///
/// let discount = AllowanceCharge::allowance(10.0, "discount", VatCategory::Standard, 15.0);
/// assert!(!discount.is_charge());
/// assert_eq!(discount.amount(), 10.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowanceCharge {
    charge_indicator: bool,
    amount: f64,
    reason: String,
    vat_category: VatCategory,
    vat_rate: f64,
}

impl AllowanceCharge {
    pub fn allowance(
        amount: f64,
        reason: impl Into<String>,
        vat_category: VatCategory,
        vat_rate: f64,
    ) -> Self {
        Self {
            charge_indicator: false,
            amount,
            reason: reason.into(),
            vat_category,
            vat_rate,
        }
    }

    pub fn charge(
        amount: f64,
        reason: impl Into<String>,
        vat_category: VatCategory,
        vat_rate: f64,
    ) -> Self {
        Self {
            charge_indicator: true,
            ..Self::allowance(amount, reason, vat_category, vat_rate)
        }
    }

    pub fn is_charge(&self) -> bool {
        self.charge_indicator
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn vat_category(&self) -> VatCategory {
        self.vat_category
    }

    pub fn vat_rate(&self) -> f64 {
        self.vat_rate
    }

    pub(crate) fn normalized(mut self, absolute: bool) -> Self {
        if absolute {
            self.amount = self.amount.abs();
        }
        if self.amount.is_nan() || self.amount < 0.0 {
            self.amount = 0.0;
        }
        self.amount = round2(self.amount);
        self
    }
}

bitflags! {
    /// Transaction flags, in the order they appear in the
    /// `InvoiceTypeCode/@name` code.
    ///
    /// # Examples
    /// ```rust
    /// use fatoora_sign::invoice::InvoiceFlags;
    ///
    /// let flags = InvoiceFlags::EXPORT | InvoiceFlags::SELF_BILLED;
    /// assert_eq!(flags.transaction_code(false), "0100101");
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct InvoiceFlags: u8 {
        const THIRD_PARTY = 0b00001;
        const NOMINAL = 0b00010;
        const EXPORT = 0b00100;
        const SUMMARY = 0b01000;
        const SELF_BILLED = 0b10000;
    }
}

impl InvoiceFlags {
    /// `01`/`02` followed by one digit per flag.
    pub fn transaction_code(&self, simplified: bool) -> String {
        let mut code = String::from(if simplified { "02" } else { "01" });
        for flag in [
            InvoiceFlags::THIRD_PARTY,
            InvoiceFlags::NOMINAL,
            InvoiceFlags::EXPORT,
            InvoiceFlags::SUMMARY,
            InvoiceFlags::SELF_BILLED,
        ] {
            code.push(if self.contains(flag) { '1' } else { '0' });
        }
        code
    }
}

/// Core invoice data model, produced by [`InvoiceBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    invoice_type: InvoiceType,
    id: String,
    uuid: String,
    issue_datetime: DateTime<Utc>,
    currency: Currency,
    previous_invoice_hash: String,
    invoice_counter: u64,
    note: Option<InvoiceNote>,
    seller: Seller,
    buyer: Option<Buyer>,
    delivery_date: Option<NaiveDate>,
    line_items: LineItems,
    allowance_charges: Vec<AllowanceCharge>,
    payment_means_code: String,
    vat_category: VatCategory,
    flags: InvoiceFlags,
}

impl InvoiceData {
    pub fn invoice_type(&self) -> &InvoiceType {
        &self.invoice_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn issue_datetime(&self) -> &DateTime<Utc> {
        &self.issue_datetime
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn previous_invoice_hash(&self) -> &str {
        &self.previous_invoice_hash
    }

    pub fn invoice_counter(&self) -> u64 {
        self.invoice_counter
    }

    pub fn note(&self) -> Option<&InvoiceNote> {
        self.note.as_ref()
    }

    pub fn seller(&self) -> &Seller {
        &self.seller
    }

    pub fn buyer(&self) -> Option<&Buyer> {
        self.buyer.as_ref()
    }

    pub fn delivery_date(&self) -> Option<NaiveDate> {
        self.delivery_date
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn allowance_charges(&self) -> &[AllowanceCharge] {
        &self.allowance_charges
    }

    pub fn payment_means_code(&self) -> &str {
        &self.payment_means_code
    }

    pub fn vat_category(&self) -> VatCategory {
        self.vat_category
    }

    pub fn flags(&self) -> InvoiceFlags {
        self.flags
    }

    pub(crate) fn seller_name(&self) -> QrResult<&str> {
        let name = self.seller.name.trim();
        if name.is_empty() {
            return Err(QrCodeError::MissingSellerName);
        }
        Ok(name)
    }

    pub(crate) fn seller_vat(&self) -> QrResult<&str> {
        let vat = self
            .seller
            .vat_id
            .as_ref()
            .ok_or(QrCodeError::MissingSellerVat)?
            .as_str()
            .trim();
        if vat.is_empty() {
            return Err(QrCodeError::MissingSellerVat);
        }
        Ok(vat)
    }

    pub(crate) fn issue_date_string(&self) -> String {
        self.issue_datetime.date_naive().to_string()
    }

    pub(crate) fn issue_time_string(&self) -> String {
        self.issue_datetime.time().format("%H:%M:%S").to_string()
    }

    pub(crate) fn format_amount(amount: f64) -> String {
        format!("{:.2}", amount)
    }
}

/// One `cac:TaxSubtotal`: the taxable base and tax for a (category, rate)
/// group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxSubtotal {
    category: VatCategory,
    rate: f64,
    taxable_amount: f64,
    tax_amount: f64,
}

impl TaxSubtotal {
    pub fn category(&self) -> VatCategory {
        self.category
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn taxable_amount(&self) -> f64 {
        self.taxable_amount
    }

    pub fn tax_amount(&self) -> f64 {
        self.tax_amount
    }
}

/// Computed invoice totals, rounded to two decimals.
///
/// `payable == round2(tax_exclusive + tax_total)` and the subtotal taxable
/// amounts sum to `tax_exclusive`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTotalsData {
    line_extension: f64,
    allowance_total: f64,
    charge_total: f64,
    tax_exclusive: f64,
    tax_total: f64,
    tax_inclusive: f64,
    prepaid: f64,
    payable: f64,
    subtotals: Vec<TaxSubtotal>,
}

impl InvoiceTotalsData {
    pub(crate) fn from_data(data: &InvoiceData) -> Self {
        let line_extension = round2(data.line_items.iter().map(|li| li.total_amount).sum());
        let allowance_total = round2(
            data.allowance_charges
                .iter()
                .filter(|ac| !ac.charge_indicator)
                .map(|ac| ac.amount)
                .sum(),
        );
        let charge_total = round2(
            data.allowance_charges
                .iter()
                .filter(|ac| ac.charge_indicator)
                .map(|ac| ac.amount)
                .sum(),
        );
        let tax_exclusive = round2(line_extension - allowance_total + charge_total);

        let mut groups: Vec<(VatCategory, f64, f64)> = Vec::new();
        let mut add = |category: VatCategory, rate: f64, amount: f64| {
            match groups
                .iter_mut()
                .find(|(c, r, _)| *c == category && same_rate(*r, rate))
            {
                Some(group) => group.2 += amount,
                None => groups.push((category, rate, amount)),
            }
        };
        for li in &data.line_items {
            add(li.vat_category, li.vat_rate, li.total_amount);
        }
        for ac in &data.allowance_charges {
            let signed = if ac.charge_indicator { ac.amount } else { -ac.amount };
            add(ac.vat_category, ac.vat_rate, signed);
        }

        let mut subtotals: Vec<TaxSubtotal> = groups
            .into_iter()
            .map(|(category, rate, base)| TaxSubtotal {
                category,
                rate,
                taxable_amount: round2(base),
                tax_amount: 0.0,
            })
            .collect();

        let allocated: f64 = subtotals.iter().map(|st| st.taxable_amount).sum();
        let remainder = round2(tax_exclusive - allocated);
        if remainder != 0.0 {
            if let Some(largest) = subtotals.iter_mut().max_by(|a, b| {
                a.taxable_amount
                    .abs()
                    .total_cmp(&b.taxable_amount.abs())
            }) {
                largest.taxable_amount = round2(largest.taxable_amount + remainder);
            }
        }
        for st in &mut subtotals {
            st.tax_amount = round2(st.taxable_amount * st.rate / 100.0);
        }

        let tax_total = round2(subtotals.iter().map(|st| st.tax_amount).sum());
        let tax_inclusive = round2(tax_exclusive + tax_total);
        let prepaid = 0.0;

        Self {
            line_extension,
            allowance_total,
            charge_total,
            tax_exclusive,
            tax_total,
            tax_inclusive,
            prepaid,
            payable: round2(tax_inclusive - prepaid),
            subtotals,
        }
    }

    pub fn line_extension(&self) -> f64 {
        self.line_extension
    }

    pub fn allowance_total(&self) -> f64 {
        self.allowance_total
    }

    pub fn charge_total(&self) -> f64 {
        self.charge_total
    }

    pub fn tax_exclusive_amount(&self) -> f64 {
        self.tax_exclusive
    }

    pub fn tax_amount(&self) -> f64 {
        self.tax_total
    }

    pub fn tax_inclusive_amount(&self) -> f64 {
        self.tax_inclusive
    }

    pub fn prepaid_amount(&self) -> f64 {
        self.prepaid
    }

    pub fn payable_amount(&self) -> f64 {
        self.payable
    }

    pub fn subtotals(&self) -> &[TaxSubtotal] {
        &self.subtotals
    }
}

fn same_rate(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

/// Round half away from zero to two decimals, normalising `-0.0`.
pub(crate) fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Acme SA, one line of 100.00 at 15%, issued 2024-01-01 12:30:00.
    pub(crate) fn build(invoice_type: InvoiceType) -> FinalizedInvoice {
        let seller = Seller::new(
            "Acme SA".into(),
            Address::new(CountryCode::SAU, "Riyadh", "King Fahd", None, "1234", None, "12222", None, None),
            "300000000000003",
            Some(OtherId::with_scheme("7003339333", "CRN")),
        )
        .unwrap();
        let buyer = Buyer::new(
            "Buyer LLC".into(),
            Address::new(CountryCode::SAU, "Jeddah", "Tahlia", None, "4321", None, "23333", None, None),
            Some("311111111111113".into()),
            None,
        )
        .unwrap();
        let issued = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        InvoiceBuilder::new(RequiredInvoiceFields {
            invoice_type,
            id: "INV-1".into(),
            uuid: "3cf5ee18-ee25-44ea-a444-2c37ba7f28be".into(),
            issue_datetime: Utc.from_utc_datetime(&issued),
            currency: Currency::SAR,
            previous_invoice_hash: "NWZlY2ViNjZmZmM4NmYzOGQ5NTI3ODZjNmQ2OTZjNzljMmRiYzIzOWRkNGU5MWI0NjcyOWQ3M2EyN2ZiNTdlOQ==".into(),
            invoice_counter: 1,
            seller,
            line_items: vec![LineItem::new(LineItemFields {
                description: "Item".into(),
                quantity: 1.0,
                unit_code: "PCE".into(),
                unit_price: 100.0,
                vat_rate: 15.0,
                vat_category: VatCategory::Standard,
            })],
            payment_means_code: "10".into(),
            vat_category: VatCategory::Standard,
        })
        .buyer(buyer)
        .build()
        .unwrap()
    }

    pub(crate) fn simplified_invoice() -> FinalizedInvoice {
        build(InvoiceType::Tax(InvoiceSubType::Simplified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(total: f64, rate: f64, category: VatCategory) -> LineItem {
        LineItem::from_totals(LineItemTotalsFields {
            description: "Item".into(),
            quantity: 1.0,
            unit_code: "PCE".into(),
            unit_price: total,
            total_amount: total,
            vat_rate: rate,
            vat_category: category,
        })
    }

    fn data(lines: Vec<LineItem>, allowance_charges: Vec<AllowanceCharge>) -> InvoiceData {
        let seller = Seller::new(
            "Acme SA".into(),
            Address::new(CountryCode::SAU, "Riyadh", "King Fahd", None, "1234", None, "12222", None, None),
            "300000000000003",
            None,
        )
        .unwrap();
        InvoiceData {
            invoice_type: InvoiceType::Tax(InvoiceSubType::Simplified),
            id: "INV-1".into(),
            uuid: "uuid".into(),
            issue_datetime: Utc::now(),
            currency: Currency::SAR,
            previous_invoice_hash: String::new(),
            invoice_counter: 1,
            note: None,
            seller,
            buyer: None,
            delivery_date: None,
            line_items: lines,
            allowance_charges,
            payment_means_code: "10".into(),
            vat_category: VatCategory::Standard,
            flags: InvoiceFlags::empty(),
        }
    }

    #[test]
    fn subtotals_group_by_category_and_rate() {
        let totals = InvoiceTotalsData::from_data(&data(
            vec![
                line(100.0, 15.0, VatCategory::Standard),
                line(50.0, 0.0, VatCategory::Zero),
                line(20.0, 15.0, VatCategory::Standard),
            ],
            vec![],
        ));
        assert_eq!(totals.subtotals().len(), 2);
        assert_eq!(totals.subtotals()[0].taxable_amount(), 120.0);
        assert_eq!(totals.subtotals()[0].tax_amount(), 18.0);
        assert_eq!(totals.subtotals()[1].category(), VatCategory::Zero);
        assert_eq!(totals.tax_exclusive_amount(), 170.0);
        assert_eq!(totals.tax_amount(), 18.0);
        assert_eq!(totals.payable_amount(), 188.0);
    }

    #[test]
    fn allowances_reduce_the_matching_group() {
        let totals = InvoiceTotalsData::from_data(&data(
            vec![line(100.0, 15.0, VatCategory::Standard)],
            vec![AllowanceCharge::allowance(10.0, "discount", VatCategory::Standard, 15.0)],
        ));
        assert_eq!(totals.allowance_total(), 10.0);
        assert_eq!(totals.tax_exclusive_amount(), 90.0);
        assert_eq!(totals.tax_amount(), 13.5);
        assert_eq!(totals.tax_inclusive_amount(), 103.5);
    }

    #[test]
    fn rounding_remainder_lands_on_largest_group() {
        let totals = InvoiceTotalsData::from_data(&data(
            vec![
                line(10.004, 15.0, VatCategory::Standard),
                line(10.004, 5.0, VatCategory::Standard),
                line(100.004, 0.0, VatCategory::Zero),
            ],
            vec![],
        ));
        let sum: f64 = totals.subtotals().iter().map(|st| st.taxable_amount()).sum();
        assert!((sum - totals.tax_exclusive_amount()).abs() < 0.005);
        assert_eq!(totals.subtotals()[2].taxable_amount(), 100.01);
    }

    #[test]
    fn flags_render_transaction_code() {
        assert_eq!(InvoiceFlags::empty().transaction_code(true), "0200000");
        assert_eq!(
            (InvoiceFlags::THIRD_PARTY | InvoiceFlags::SUMMARY).transaction_code(false),
            "0110010"
        );
    }

    #[test]
    fn allowance_amounts_are_clamped() {
        let negative = AllowanceCharge::allowance(-5.0, "x", VatCategory::Standard, 15.0);
        assert_eq!(negative.clone().normalized(false).amount(), 0.0);
        assert_eq!(negative.normalized(true).amount(), 5.0);
    }

    #[test]
    fn round2_normalises_negative_zero() {
        assert_eq!(round2(-0.001).to_string(), "0");
        assert_eq!(round2(2.675 * 1.0 + 0.0001), 2.68);
    }
}
