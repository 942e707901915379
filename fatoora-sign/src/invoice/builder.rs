use super::sign::{InvoiceSigner, SignedProperties, SigningError};
use super::{
    AllowanceCharge, Buyer, InvoiceData, InvoiceError, InvoiceField, InvoiceFlags, InvoiceNote,
    InvoiceSubType, InvoiceTotalsData, InvoiceType, LineItems, Seller, ValidationError,
    ValidationIssue, ValidationKind, VatCategory,
};
use crate::certificate::Certificate;
use crate::submission::SubmissionPayload;
use base64ct::{Base64, Encoding};
use chrono::{DateTime, NaiveDate, Utc};
use iso_currency::Currency;
use std::sync::Arc;

/// Validated invoice with computed totals, ready for XML generation and
/// signing.
#[derive(Debug, Clone)]
pub struct FinalizedInvoice {
    data: InvoiceData,
    totals: InvoiceTotalsData,
}

/// Output of the signing pipeline.
#[derive(Debug, Clone)]
pub struct SignedInvoice {
    xml: String,
    invoice_hash: String,
    signature: String,
    qr_code: String,
    uuid: String,
    signed_properties: SignedProperties,
    certificate: Arc<Certificate>,
}

/// Fields every invoice needs.
#[derive(Debug, Clone)]
pub struct RequiredInvoiceFields {
    pub invoice_type: InvoiceType,
    pub id: String,
    pub uuid: String,
    pub issue_datetime: DateTime<Utc>,
    pub currency: Currency,
    pub previous_invoice_hash: String,
    pub invoice_counter: u64,
    pub seller: Seller,
    pub line_items: LineItems,
    pub payment_means_code: String,
    pub vat_category: VatCategory,
}

/// Builds a [`FinalizedInvoice`], collecting every validation issue.
///
/// # Examples
/// ```rust,no_run
/// use fatoora_sign::invoice::{InvoiceBuilder, InvoiceFlags, RequiredInvoiceFields};
///
/// let fields: RequiredInvoiceFields = unimplemented!();
/// let invoice = InvoiceBuilder::new(fields)
///     .flags(InvoiceFlags::EXPORT)
///     .invoice_level_discount(5.0)
///     .build()?;
/// # let _ = invoice;
/// # Ok::<(), fatoora_sign::invoice::InvoiceError>(())
/// ```
pub struct InvoiceBuilder {
    invoice: InvoiceData,
    allowance_reason: Option<String>,
}

impl InvoiceBuilder {
    pub fn new(fields: RequiredInvoiceFields) -> Self {
        Self {
            invoice: InvoiceData {
                invoice_type: fields.invoice_type,
                id: fields.id,
                uuid: fields.uuid,
                issue_datetime: fields.issue_datetime,
                currency: fields.currency,
                previous_invoice_hash: fields.previous_invoice_hash,
                invoice_counter: fields.invoice_counter,
                note: None,
                seller: fields.seller,
                buyer: None,
                delivery_date: None,
                line_items: fields.line_items,
                allowance_charges: Vec::new(),
                payment_means_code: fields.payment_means_code,
                vat_category: fields.vat_category,
                flags: InvoiceFlags::empty(),
            },
            allowance_reason: None,
        }
    }

    pub fn note(mut self, note: InvoiceNote) -> Self {
        self.invoice.note = Some(note);
        self
    }

    pub fn buyer(mut self, buyer: Buyer) -> Self {
        self.invoice.buyer = Some(buyer);
        self
    }

    pub fn delivery_date(mut self, date: NaiveDate) -> Self {
        self.invoice.delivery_date = Some(date);
        self
    }

    pub fn flags(mut self, flags: InvoiceFlags) -> Self {
        self.invoice.flags = flags;
        self
    }

    pub fn allowance_charge(mut self, allowance_charge: AllowanceCharge) -> Self {
        self.invoice.allowance_charges.push(allowance_charge);
        self
    }

    /// Document discount in the invoice's default VAT category, at the rate
    /// of the first line.
    pub fn invoice_level_discount(self, amount: f64) -> Self {
        let (category, rate) = self.default_tax();
        let reason = self.allowance_reason.clone().unwrap_or_else(|| "discount".into());
        self.allowance_charge(AllowanceCharge::allowance(amount, reason, category, rate))
    }

    /// Document charge in the invoice's default VAT category.
    pub fn invoice_level_charge(self, amount: f64) -> Self {
        let (category, rate) = self.default_tax();
        let reason = self.allowance_reason.clone().unwrap_or_else(|| "charge".into());
        self.allowance_charge(AllowanceCharge::charge(amount, reason, category, rate))
    }

    /// Reason used by later `invoice_level_*` calls.
    pub fn allowance_reason(mut self, reason: impl Into<String>) -> Self {
        self.allowance_reason = Some(reason.into());
        self
    }

    fn default_tax(&self) -> (VatCategory, f64) {
        let rate = self
            .invoice
            .line_items
            .first()
            .map(|li| li.vat_rate)
            .unwrap_or_default();
        (self.invoice.vat_category, rate)
    }

    /// Validate and compute totals.
    ///
    /// # Errors
    /// Returns [`InvoiceError::Validation`] listing every issue found.
    pub fn build(self) -> Result<FinalizedInvoice, InvoiceError> {
        let mut invoice = self.invoice;
        let credit_note = invoice.invoice_type.is_credit_note();
        if credit_note {
            invoice.line_items = invoice
                .line_items
                .into_iter()
                .map(|li| li.into_absolute())
                .collect();
        }
        invoice.allowance_charges = invoice
            .allowance_charges
            .into_iter()
            .map(|ac| ac.normalized(credit_note))
            .collect();

        let mut issues = validate(&invoice);
        let totals = InvoiceTotalsData::from_data(&invoice);
        if totals.tax_inclusive_amount().is_nan() || totals.tax_inclusive_amount() <= 0.0 {
            issues.push(ValidationIssue::invoice(
                InvoiceField::PayableAmount,
                ValidationKind::OutOfRange,
            ));
        }

        if !issues.is_empty() {
            return Err(ValidationError::new(issues).into());
        }
        Ok(FinalizedInvoice {
            data: invoice,
            totals,
        })
    }
}

fn validate(invoice: &InvoiceData) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut required = |field: InvoiceField, value: &str| {
        if value.trim().is_empty() {
            issues.push(ValidationIssue::invoice(field, ValidationKind::Empty));
        }
    };
    required(InvoiceField::Id, &invoice.id);
    required(InvoiceField::Uuid, &invoice.uuid);
    required(InvoiceField::PaymentMeansCode, &invoice.payment_means_code);

    if let Some(original) = invoice.invoice_type.original_invoice() {
        required(InvoiceField::BillingReference, original.id());
    }
    if let Some(reason) = invoice.invoice_type.note_reason() {
        required(InvoiceField::NoteReason, reason);
    }

    if invoice.invoice_type.sub_type() == InvoiceSubType::Standard && invoice.buyer.is_none() {
        issues.push(ValidationIssue::invoice(
            InvoiceField::Buyer,
            ValidationKind::Missing,
        ));
    }

    if invoice.line_items.is_empty() {
        issues.push(ValidationIssue::invoice(
            InvoiceField::LineItems,
            ValidationKind::Missing,
        ));
    }
    for (idx, li) in invoice.line_items.iter().enumerate() {
        let mut push = |field, kind| issues.push(ValidationIssue::line(idx, field, kind));
        if li.description.trim().is_empty() {
            push(InvoiceField::LineItemDescription, ValidationKind::Empty);
        }
        if li.unit_code.trim().is_empty() {
            push(InvoiceField::LineItemUnitCode, ValidationKind::Empty);
        }
        if li.quantity.is_nan() || li.quantity <= 0.0 {
            push(InvoiceField::LineItemQuantity, ValidationKind::OutOfRange);
        }
        if li.unit_price < 0.0 {
            push(InvoiceField::LineItemUnitPrice, ValidationKind::OutOfRange);
        }
        if li.total_amount < 0.0 {
            push(InvoiceField::LineItemTotalAmount, ValidationKind::OutOfRange);
        }
        if li.vat_rate < 0.0 {
            push(InvoiceField::LineItemVatRate, ValidationKind::OutOfRange);
        }
        if li.vat_amount < 0.0 {
            push(InvoiceField::LineItemVatAmount, ValidationKind::OutOfRange);
        }
    }
    issues
}

impl FinalizedInvoice {
    pub fn data(&self) -> &InvoiceData {
        &self.data
    }

    pub fn totals(&self) -> &InvoiceTotalsData {
        &self.totals
    }

    pub fn sign(&self, signer: &InvoiceSigner) -> Result<SignedInvoice, SigningError> {
        signer.sign(self)
    }
}

impl SignedInvoice {
    pub(crate) fn new(
        xml: String,
        qr_code: String,
        uuid: String,
        signed_properties: SignedProperties,
        certificate: Arc<Certificate>,
    ) -> Self {
        Self {
            xml,
            invoice_hash: signed_properties.invoice_hash().to_string(),
            signature: signed_properties.signature().to_string(),
            qr_code,
            uuid,
            signed_properties,
            certificate,
        }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn qr_code(&self) -> &str {
        &self.qr_code
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn signed_properties(&self) -> &SignedProperties {
        &self.signed_properties
    }

    pub fn certificate(&self) -> &Arc<Certificate> {
        &self.certificate
    }

    pub fn to_xml_base64(&self) -> String {
        Base64::encode_string(self.xml.as_bytes())
    }

    pub fn submission_payload(&self) -> SubmissionPayload {
        SubmissionPayload::new(self.to_xml_base64(), &self.invoice_hash, &self.uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{
        Address, LineItem, LineItemFields, OriginalInvoiceRef, Party, SellerRole,
    };
    use isocountry::CountryCode;

    fn seller() -> Seller {
        Party::<SellerRole>::new(
            "Acme SA".into(),
            Address::new(CountryCode::SAU, "Riyadh", "King Fahd", None, "1234", None, "12222", None, None),
            "300000000000003",
            None,
        )
        .unwrap()
    }

    fn item(quantity: f64, unit_price: f64) -> LineItem {
        LineItem::new(LineItemFields {
            description: "Item".into(),
            quantity,
            unit_code: "PCE".into(),
            unit_price,
            vat_rate: 15.0,
            vat_category: VatCategory::Standard,
        })
    }

    fn fields(invoice_type: InvoiceType, line_items: LineItems) -> RequiredInvoiceFields {
        RequiredInvoiceFields {
            invoice_type,
            id: "INV-1".into(),
            uuid: "uuid-1".into(),
            issue_datetime: Utc::now(),
            currency: Currency::SAR,
            previous_invoice_hash: String::new(),
            invoice_counter: 1,
            seller: seller(),
            line_items,
            payment_means_code: "10".into(),
            vat_category: VatCategory::Standard,
        }
    }

    fn issues(result: Result<FinalizedInvoice, InvoiceError>) -> ValidationError {
        match result {
            Err(InvoiceError::Validation(err)) => err,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn credit_notes_state_refunds_positively() {
        let invoice = InvoiceBuilder::new(fields(
            InvoiceType::CreditNote(
                InvoiceSubType::Simplified,
                OriginalInvoiceRef::new("INV-42"),
                "returned".into(),
            ),
            vec![item(-1.0, -100.0)],
        ))
        .invoice_level_discount(-10.0)
        .build()
        .unwrap();
        let line = &invoice.data().line_items()[0];
        assert_eq!(line.quantity(), 1.0);
        assert_eq!(line.total_amount(), 100.0);
        assert_eq!(invoice.data().allowance_charges()[0].amount(), 10.0);
        assert_eq!(invoice.totals().tax_exclusive_amount(), 90.0);
    }

    #[test]
    fn zero_amount_is_rejected() {
        let err = issues(InvoiceBuilder::new(fields(
            InvoiceType::Tax(InvoiceSubType::Simplified),
            vec![item(1.0, 0.0)],
        ))
        .build());
        assert!(err.has(InvoiceField::PayableAmount, ValidationKind::OutOfRange));
    }

    #[test]
    fn standard_invoices_need_a_buyer() {
        let err = issues(InvoiceBuilder::new(fields(
            InvoiceType::Tax(InvoiceSubType::Standard),
            vec![item(1.0, 100.0)],
        ))
        .build());
        assert!(err.has(InvoiceField::Buyer, ValidationKind::Missing));
    }

    #[test]
    fn notes_need_a_reference_and_reason() {
        let err = issues(InvoiceBuilder::new(fields(
            InvoiceType::DebitNote(
                InvoiceSubType::Simplified,
                OriginalInvoiceRef::new(" "),
                String::new(),
            ),
            vec![item(1.0, 100.0)],
        ))
        .build());
        assert!(err.has(InvoiceField::BillingReference, ValidationKind::Empty));
        assert!(err.has(InvoiceField::NoteReason, ValidationKind::Empty));
    }

    #[test]
    fn discount_uses_default_category_and_first_rate() {
        let invoice = InvoiceBuilder::new(fields(
            InvoiceType::Tax(InvoiceSubType::Simplified),
            vec![item(2.0, 50.0)],
        ))
        .allowance_reason("loyalty")
        .invoice_level_discount(10.0)
        .invoice_level_charge(4.0)
        .build()
        .unwrap();
        let acs = invoice.data().allowance_charges();
        assert_eq!(acs[0].reason(), "loyalty");
        assert_eq!(acs[0].vat_rate(), 15.0);
        assert!(acs[1].is_charge());
        assert_eq!(invoice.totals().tax_exclusive_amount(), 94.0);
        assert_eq!(invoice.totals().charge_total(), 4.0);
    }

    #[test]
    fn signed_invoice_builds_its_submission_payload() {
        use crate::certificate::test_support::certificate;
        use crate::config::Config;
        use crate::invoice::test_support::simplified_invoice;

        let signer = InvoiceSigner::new(Arc::new(certificate()), Config::default());
        let signed = simplified_invoice().sign(&signer).unwrap();
        let payload = signed.submission_payload();
        assert_eq!(payload.invoice_hash(), signed.invoice_hash());
        assert_eq!(payload.uuid(), "3cf5ee18-ee25-44ea-a444-2c37ba7f28be");
        assert_eq!(
            Base64::decode_vec(payload.invoice()).unwrap(),
            signed.xml().as_bytes()
        );
        assert!(payload.to_json().unwrap().contains("\"invoiceHash\":"));
    }
}
