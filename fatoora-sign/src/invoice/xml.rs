//! UBL 2.1 serialization for invoices.
use super::{
    Address, AllowanceCharge, Buyer, FinalizedInvoice, InvoiceData, InvoiceNote, LineItem,
    OriginalInvoiceRef, OtherId, Party, PartyRole, Seller, TaxSubtotal, VatCategory, VatId,
};

use constants::{CAC_NS, CBC_NS, EXT_NS, INVOICE_NS};
use helpers::{
    FixedPrecision, currency_amount, id_with_scheme, id_with_scheme_with_agency,
    quantity_with_unit,
};
use quick_xml::se::{SeError, Serializer as QuickXmlSerializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

pub(crate) mod constants;

/// Wrapper for serializing invoices to XML.
pub struct InvoiceXml<'a>(pub &'a FinalizedInvoice);

#[derive(Debug, Error)]
pub enum InvoiceXmlError {
    #[error("failed to serialize invoice to XML: {source}")]
    Serialize {
        #[from]
        source: SeError,
    },
}

/// XML formatting options.
#[derive(Debug, Clone, Copy, Default)]
pub enum XmlFormat {
    Compact,
    #[default]
    Pretty,
    PrettyWith {
        indent_char: char,
        indent_size: usize,
    },
}

mod helpers {
    use serde::ser::{Serialize, SerializeStruct, Serializer};
    use std::fmt::{self, Display, Formatter};

    pub(super) struct FixedPrecision {
        value: f64,
        precision: usize,
    }

    impl FixedPrecision {
        pub(super) fn new(value: f64, precision: usize) -> Self {
            Self { value, precision }
        }
    }

    impl Display for FixedPrecision {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            let value = if self.value == 0.0 { 0.0 } else { self.value };
            write!(f, "{:.*}", self.precision, value)
        }
    }

    impl Serialize for FixedPrecision {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            serializer.collect_str(self)
        }
    }

    struct CurrencyAmountSer<'a> {
        tag: &'static str,
        currency: &'a str,
        value: f64,
    }

    pub(super) fn currency_amount<'a>(
        tag: &'static str,
        currency: &'a str,
        value: f64,
    ) -> impl Serialize + 'a {
        CurrencyAmountSer {
            tag,
            currency,
            value,
        }
    }

    impl<'a> Serialize for CurrencyAmountSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@currencyID", self.currency)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 2))?;
            st.end()
        }
    }

    struct IdWithSchemeSer<'a> {
        tag: &'static str,
        scheme_id: &'a str,
        scheme_agency_id: Option<&'a str>,
        value: &'a str,
    }

    pub(super) fn id_with_scheme<'a>(
        tag: &'static str,
        scheme_id: &'a str,
        value: &'a str,
    ) -> impl Serialize + 'a {
        IdWithSchemeSer {
            tag,
            scheme_id,
            scheme_agency_id: None,
            value,
        }
    }

    pub(super) fn id_with_scheme_with_agency<'a>(
        tag: &'static str,
        scheme_id: &'a str,
        scheme_agency_id: &'a str,
        value: &'a str,
    ) -> impl Serialize + 'a {
        IdWithSchemeSer {
            tag,
            scheme_id,
            scheme_agency_id: Some(scheme_agency_id),
            value,
        }
    }

    impl<'a> Serialize for IdWithSchemeSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 3)?;
            st.serialize_field("@schemeID", self.scheme_id)?;
            if let Some(agency) = self.scheme_agency_id {
                st.serialize_field("@schemeAgencyID", agency)?;
            }
            st.serialize_field("$text", self.value)?;
            st.end()
        }
    }

    struct QuantityWithUnitSer<'a> {
        tag: &'static str,
        value: f64,
        unit_code: &'a str,
    }

    pub(super) fn quantity_with_unit<'a>(
        tag: &'static str,
        value: f64,
        unit_code: &'a str,
    ) -> impl Serialize + 'a {
        QuantityWithUnitSer {
            tag,
            value,
            unit_code,
        }
    }

    impl<'a> Serialize for QuantityWithUnitSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct(self.tag, 2)?;
            st.serialize_field("@unitCode", self.unit_code)?;
            st.serialize_field("$text", &FixedPrecision::new(self.value, 6))?;
            st.end()
        }
    }
}

struct InvoiceTypeCodeXml<'a>(&'a InvoiceData);

impl<'a> Serialize for InvoiceTypeCodeXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.0;
        let name = data
            .flags
            .transaction_code(data.invoice_type.is_simplified());
        let mut st = s.serialize_struct("cbc:InvoiceTypeCode", 2)?;
        st.serialize_field("@name", &name)?;
        st.serialize_field("$text", data.invoice_type.type_code())?;
        st.end()
    }
}

struct TaxSchemeXml;

impl Serialize for TaxSchemeXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:TaxScheme", 0)?;
        st.serialize_field(
            "cbc:ID",
            &id_with_scheme_with_agency("cbc:ID", "UN/ECE 5153", "6", "VAT"),
        )?;
        st.end()
    }
}

struct VatSchemeXml<'a>(&'a VatId);

impl<'a> Serialize for VatSchemeXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyTaxScheme", 0)?;
        st.serialize_field("cbc:CompanyID", self.0.as_str())?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

struct PartyXml<'a, R: PartyRole>(&'a Party<R>);

struct PartyIdentificationXml<'a>(&'a OtherId);

impl<'a> Serialize for PartyIdentificationXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let other_id = self.0;
        let mut st = s.serialize_struct("cac:PartyIdentification", 0)?;
        match other_id.scheme_id() {
            Some(scheme_id) => st.serialize_field(
                "cbc:ID",
                &id_with_scheme("cbc:ID", scheme_id, other_id.as_str()),
            )?,
            None => st.serialize_field("cbc:ID", other_id.as_str())?,
        }
        st.end()
    }
}

struct PartyLegalEntityXml<'a>(&'a str);

impl<'a> Serialize for PartyLegalEntityXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:PartyLegalEntity", 0)?;
        st.serialize_field("cbc:RegistrationName", self.0)?;
        st.end()
    }
}

impl<'a, R: PartyRole> Serialize for PartyXml<'a, R> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let p = self.0;
        let mut st = s.serialize_struct("cac:Party", 0)?;
        if let Some(other_id) = &p.other_id {
            st.serialize_field("cac:PartyIdentification", &PartyIdentificationXml(other_id))?;
        }
        st.serialize_field("cac:PostalAddress", &AddressXml(&p.address))?;
        if let Some(vat) = &p.vat_id {
            st.serialize_field("cac:PartyTaxScheme", &VatSchemeXml(vat))?;
        }
        st.serialize_field("cac:PartyLegalEntity", &PartyLegalEntityXml(&p.name))?;
        st.end()
    }
}

struct AccountingSupplierPartyXml<'a>(&'a Seller);

impl<'a> Serialize for AccountingSupplierPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AccountingSupplierParty", 0)?;
        st.serialize_field("cac:Party", &PartyXml(self.0))?;
        st.end()
    }
}

struct AccountingCustomerPartyXml<'a>(Option<&'a Buyer>);

impl<'a> Serialize for AccountingCustomerPartyXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AccountingCustomerParty", 0)?;
        match self.0 {
            Some(party) => st.serialize_field("cac:Party", &PartyXml(party))?,
            None => st.serialize_field("cac:Party", &EmptyParty)?,
        }
        st.end()
    }
}

struct EmptyParty;

impl Serialize for EmptyParty {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_struct("cac:Party", 0)?.end()
    }
}

struct AddressXml<'a>(&'a Address);

impl<'a> Serialize for AddressXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let a = self.0;
        let mut st = s.serialize_struct("cac:PostalAddress", 0)?;
        st.serialize_field("cbc:StreetName", &a.street)?;
        if let Some(additional) = &a.additional_street {
            st.serialize_field("cbc:AdditionalStreetName", additional)?;
        }
        st.serialize_field("cbc:BuildingNumber", &a.building_number)?;
        if let Some(plot) = &a.additional_number {
            st.serialize_field("cbc:PlotIdentification", plot)?;
        }
        if let Some(district) = &a.district {
            st.serialize_field("cbc:CitySubdivisionName", district)?;
        }
        st.serialize_field("cbc:CityName", &a.city)?;
        st.serialize_field("cbc:PostalZone", &a.postal_code)?;
        if let Some(subdivision) = &a.subdivision {
            st.serialize_field("cbc:CountrySubentity", subdivision)?;
        }
        st.serialize_field("cac:Country", &CountryXml(a.country_code.alpha2()))?;
        st.end()
    }
}

struct CountryXml<'a>(&'a str);

impl<'a> Serialize for CountryXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Country", 0)?;
        st.serialize_field("cbc:IdentificationCode", self.0)?;
        st.end()
    }
}

struct NoteXml<'a>(&'a InvoiceNote);

impl<'a> Serialize for NoteXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let note = self.0;
        let mut st = s.serialize_struct("cbc:Note", 2)?;
        st.serialize_field("@languageID", &note.language)?;
        st.serialize_field("$text", &note.text)?;
        st.end()
    }
}

struct BillingReferenceXml<'a>(&'a OriginalInvoiceRef);

struct InvoiceDocumentReferenceXml<'a>(&'a OriginalInvoiceRef);

impl<'a> Serialize for InvoiceDocumentReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:InvoiceDocumentReference", 0)?;
        st.serialize_field("cbc:ID", self.0.id())?;
        if let Some(uuid) = self.0.uuid() {
            st.serialize_field("cbc:UUID", uuid)?;
        }
        if let Some(issue_date) = self.0.issue_date() {
            st.serialize_field("cbc:IssueDate", &issue_date.to_string())?;
        }
        st.end()
    }
}

impl<'a> Serialize for BillingReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:BillingReference", 0)?;
        st.serialize_field(
            "cac:InvoiceDocumentReference",
            &InvoiceDocumentReferenceXml(self.0),
        )?;
        st.end()
    }
}

enum AdditionalDocumentReferenceXml<'a> {
    InvoiceCounter(&'a str),
    PreviousInvoiceHash(&'a str),
}

impl<'a> Serialize for AdditionalDocumentReferenceXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:AdditionalDocumentReference", 0)?;
        match self {
            AdditionalDocumentReferenceXml::InvoiceCounter(value) => {
                st.serialize_field("cbc:ID", "ICV")?;
                st.serialize_field("cbc:UUID", value)?;
            }
            AdditionalDocumentReferenceXml::PreviousInvoiceHash(value) => {
                st.serialize_field("cbc:ID", "PIH")?;
                st.serialize_field("cac:Attachment", &AttachmentXml(value))?;
            }
        }
        st.end()
    }
}

struct AttachmentXml<'a>(&'a str);

impl<'a> Serialize for AttachmentXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct EmbeddedDocumentXml<'a>(&'a str);
        impl<'a> Serialize for EmbeddedDocumentXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cbc:EmbeddedDocumentBinaryObject", 2)?;
                st.serialize_field("@mimeCode", "text/plain")?;
                st.serialize_field("$text", self.0)?;
                st.end()
            }
        }

        let mut st = s.serialize_struct("cac:Attachment", 0)?;
        st.serialize_field(
            "cbc:EmbeddedDocumentBinaryObject",
            &EmbeddedDocumentXml(self.0),
        )?;
        st.end()
    }
}

struct DeliveryXml(chrono::NaiveDate);

impl Serialize for DeliveryXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct("cac:Delivery", 0)?;
        st.serialize_field("cbc:ActualDeliveryDate", &self.0.to_string())?;
        st.end()
    }
}

struct TaxCategoryXml {
    tag: &'static str,
    category: VatCategory,
    percent: f64,
}

impl Serialize for TaxCategoryXml {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut st = s.serialize_struct(self.tag, 0)?;
        st.serialize_field(
            "cbc:ID",
            &id_with_scheme_with_agency("cbc:ID", "UN/ECE 5305", "6", self.category.code()),
        )?;
        st.serialize_field("cbc:Percent", &FixedPrecision::new(self.percent, 2))?;
        st.serialize_field("cac:TaxScheme", &TaxSchemeXml)?;
        st.end()
    }
}

fn allowance_charge<'a>(ac: &'a AllowanceCharge, currency: &'a str) -> impl Serialize + 'a {
    struct AllowanceChargeSer<'a> {
        ac: &'a AllowanceCharge,
        currency: &'a str,
    }
    impl<'a> Serialize for AllowanceChargeSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let ac = self.ac;
            let mut st = s.serialize_struct("cac:AllowanceCharge", 0)?;
            st.serialize_field("cbc:ChargeIndicator", &ac.charge_indicator)?;
            st.serialize_field("cbc:AllowanceChargeReason", &ac.reason)?;
            st.serialize_field(
                "cbc:Amount",
                &currency_amount("cbc:Amount", self.currency, ac.amount),
            )?;
            st.serialize_field(
                "cac:TaxCategory",
                &TaxCategoryXml {
                    tag: "cac:TaxCategory",
                    category: ac.vat_category,
                    percent: ac.vat_rate,
                },
            )?;
            st.end()
        }
    }
    AllowanceChargeSer { ac, currency }
}

fn tax_total<'a>(
    amount: f64,
    currency: &'a str,
    subtotals: &'a [TaxSubtotal],
) -> impl Serialize + 'a {
    struct TaxTotalSer<'a> {
        amount: f64,
        currency: &'a str,
        subtotals: &'a [TaxSubtotal],
    }
    impl<'a> Serialize for TaxTotalSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
            st.serialize_field(
                "cbc:TaxAmount",
                &currency_amount("cbc:TaxAmount", self.currency, self.amount),
            )?;
            for subtotal in self.subtotals {
                st.serialize_field("cac:TaxSubtotal", &tax_subtotal(subtotal, self.currency))?;
            }
            st.end()
        }
    }
    TaxTotalSer {
        amount,
        currency,
        subtotals,
    }
}

fn tax_subtotal<'a>(data: &'a TaxSubtotal, currency: &'a str) -> impl Serialize + 'a {
    struct TaxSubtotalSer<'a> {
        data: &'a TaxSubtotal,
        currency: &'a str,
    }
    impl<'a> Serialize for TaxSubtotalSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let data = self.data;
            let mut st = s.serialize_struct("cac:TaxSubtotal", 0)?;
            st.serialize_field(
                "cbc:TaxableAmount",
                &currency_amount("cbc:TaxableAmount", self.currency, data.taxable_amount),
            )?;
            st.serialize_field(
                "cbc:TaxAmount",
                &currency_amount("cbc:TaxAmount", self.currency, data.tax_amount),
            )?;
            st.serialize_field(
                "cac:TaxCategory",
                &TaxCategoryXml {
                    tag: "cac:TaxCategory",
                    category: data.category,
                    percent: data.rate,
                },
            )?;
            st.end()
        }
    }
    TaxSubtotalSer { data, currency }
}

fn legal_monetary_total<'a>(
    totals: &'a super::InvoiceTotalsData,
    currency: &'a str,
) -> impl Serialize + 'a {
    struct LegalMonetaryTotalSer<'a> {
        totals: &'a super::InvoiceTotalsData,
        currency: &'a str,
    }
    impl<'a> Serialize for LegalMonetaryTotalSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let t = self.totals;
            let amount = |tag: &'static str, value: f64| currency_amount(tag, self.currency, value);
            let mut st = s.serialize_struct("cac:LegalMonetaryTotal", 0)?;
            st.serialize_field(
                "cbc:LineExtensionAmount",
                &amount("cbc:LineExtensionAmount", t.line_extension),
            )?;
            st.serialize_field(
                "cbc:TaxExclusiveAmount",
                &amount("cbc:TaxExclusiveAmount", t.tax_exclusive),
            )?;
            st.serialize_field(
                "cbc:TaxInclusiveAmount",
                &amount("cbc:TaxInclusiveAmount", t.tax_inclusive),
            )?;
            st.serialize_field(
                "cbc:AllowanceTotalAmount",
                &amount("cbc:AllowanceTotalAmount", t.allowance_total),
            )?;
            if t.charge_total > 0.0 {
                st.serialize_field(
                    "cbc:ChargeTotalAmount",
                    &amount("cbc:ChargeTotalAmount", t.charge_total),
                )?;
            }
            st.serialize_field(
                "cbc:PrepaidAmount",
                &amount("cbc:PrepaidAmount", t.prepaid),
            )?;
            st.serialize_field(
                "cbc:PayableAmount",
                &amount("cbc:PayableAmount", t.payable),
            )?;
            st.end()
        }
    }
    LegalMonetaryTotalSer { totals, currency }
}

fn payment_means<'a>(code: &'a str, instruction_note: Option<&'a str>) -> impl Serialize + 'a {
    struct PaymentMeansSer<'a> {
        code: &'a str,
        instruction_note: Option<&'a str>,
    }
    impl<'a> Serialize for PaymentMeansSer<'a> {
        fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            let mut st = s.serialize_struct("cac:PaymentMeans", 0)?;
            st.serialize_field("cbc:PaymentMeansCode", self.code)?;
            if let Some(note) = self.instruction_note {
                st.serialize_field("cbc:InstructionNote", note)?;
            }
            st.end()
        }
    }
    PaymentMeansSer {
        code,
        instruction_note,
    }
}

struct InvoiceLineXml<'a> {
    index: usize,
    line: &'a LineItem,
    currency: &'a str,
}

impl<'a> Serialize for InvoiceLineXml<'a> {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        struct LineTaxTotal<'a>(&'a LineItem, &'a str);
        impl<'a> Serialize for LineTaxTotal<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let (li, currency) = (self.0, self.1);
                let mut st = s.serialize_struct("cac:TaxTotal", 0)?;
                st.serialize_field(
                    "cbc:TaxAmount",
                    &currency_amount("cbc:TaxAmount", currency, li.vat_amount),
                )?;
                st.serialize_field(
                    "cbc:RoundingAmount",
                    &currency_amount(
                        "cbc:RoundingAmount",
                        currency,
                        super::round2(li.total_amount + li.vat_amount),
                    ),
                )?;
                st.end()
            }
        }

        struct ItemXml<'a>(&'a LineItem);
        impl<'a> Serialize for ItemXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cac:Item", 0)?;
                st.serialize_field("cbc:Name", &self.0.description)?;
                st.serialize_field(
                    "cac:ClassifiedTaxCategory",
                    &TaxCategoryXml {
                        tag: "cac:ClassifiedTaxCategory",
                        category: self.0.vat_category,
                        percent: self.0.vat_rate,
                    },
                )?;
                st.end()
            }
        }

        struct PriceXml<'a>(f64, &'a str);
        impl<'a> Serialize for PriceXml<'a> {
            fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                let mut st = s.serialize_struct("cac:Price", 0)?;
                st.serialize_field(
                    "cbc:PriceAmount",
                    &currency_amount("cbc:PriceAmount", self.1, self.0),
                )?;
                st.end()
            }
        }

        let li = self.line;
        let mut st = s.serialize_struct("cac:InvoiceLine", 0)?;
        st.serialize_field("cbc:ID", &self.index.to_string())?;
        st.serialize_field(
            "cbc:InvoicedQuantity",
            &quantity_with_unit("cbc:InvoicedQuantity", li.quantity, &li.unit_code),
        )?;
        st.serialize_field(
            "cbc:LineExtensionAmount",
            &currency_amount("cbc:LineExtensionAmount", self.currency, li.total_amount),
        )?;
        st.serialize_field("cac:TaxTotal", &LineTaxTotal(li, self.currency))?;
        st.serialize_field("cac:Item", &ItemXml(li))?;
        st.serialize_field("cac:Price", &PriceXml(li.unit_price, self.currency))?;
        st.end()
    }
}

/// Serialize invoices to UBL XML.
///
/// # Examples
/// ```rust,no_run
/// use fatoora_sign::invoice::xml::ToXml;
/// use fatoora_sign::invoice::FinalizedInvoice;
///
/// let invoice: FinalizedInvoice = unimplemented!();
/// let xml = invoice.to_xml()?;
/// # let _ = xml;
/// # Ok::<(), fatoora_sign::invoice::xml::InvoiceXmlError>(())
/// ```
pub trait ToXml {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, InvoiceXmlError>;

    /// Declaration plus 4-space indentation.
    fn to_xml(&self) -> Result<String, InvoiceXmlError> {
        self.to_xml_with_format(XmlFormat::Pretty)
    }
}

impl ToXml for FinalizedInvoice {
    fn to_xml_with_format(&self, format: XmlFormat) -> Result<String, InvoiceXmlError> {
        let mut buffer = String::with_capacity(4096);
        buffer.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        buffer.push('\n');

        {
            let mut serializer = QuickXmlSerializer::new(&mut buffer);
            match format {
                XmlFormat::Compact => {}
                XmlFormat::Pretty => {
                    serializer.indent(' ', 4);
                }
                XmlFormat::PrettyWith {
                    indent_char,
                    indent_size,
                } => {
                    serializer.indent(indent_char, indent_size);
                }
            }
            InvoiceXml(self).serialize(serializer)?;
        }

        Ok(buffer)
    }
}

impl<'a> Serialize for InvoiceXml<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.0.data();
        let totals = self.0.totals();
        let currency_code = data.currency.code();

        let mut root = serializer.serialize_struct("Invoice", 0)?;

        root.serialize_field("@xmlns", INVOICE_NS)?;
        root.serialize_field("@xmlns:cac", CAC_NS)?;
        root.serialize_field("@xmlns:cbc", CBC_NS)?;
        root.serialize_field("@xmlns:ext", EXT_NS)?;

        root.serialize_field("cbc:ProfileID", "reporting:1.0")?;
        root.serialize_field("cbc:ID", &data.id)?;
        root.serialize_field("cbc:UUID", &data.uuid)?;
        root.serialize_field("cbc:IssueDate", &data.issue_date_string())?;
        root.serialize_field("cbc:IssueTime", &data.issue_time_string())?;
        root.serialize_field("cbc:InvoiceTypeCode", &InvoiceTypeCodeXml(data))?;
        if let Some(note) = data.note.as_ref() {
            root.serialize_field("cbc:Note", &NoteXml(note))?;
        }
        root.serialize_field("cbc:DocumentCurrencyCode", currency_code)?;
        root.serialize_field("cbc:TaxCurrencyCode", currency_code)?;

        if let Some(original) = data.invoice_type.original_invoice() {
            root.serialize_field("cac:BillingReference", &BillingReferenceXml(original))?;
        }

        let counter = data.invoice_counter.to_string();
        root.serialize_field(
            "cac:AdditionalDocumentReference",
            &AdditionalDocumentReferenceXml::InvoiceCounter(&counter),
        )?;
        root.serialize_field(
            "cac:AdditionalDocumentReference",
            &AdditionalDocumentReferenceXml::PreviousInvoiceHash(&data.previous_invoice_hash),
        )?;

        root.serialize_field(
            "cac:AccountingSupplierParty",
            &AccountingSupplierPartyXml(&data.seller),
        )?;
        root.serialize_field(
            "cac:AccountingCustomerParty",
            &AccountingCustomerPartyXml(data.buyer.as_ref()),
        )?;
        if let Some(date) = data.delivery_date {
            root.serialize_field("cac:Delivery", &DeliveryXml(date))?;
        }

        let instruction_note = data
            .invoice_type
            .note_reason()
            .filter(|reason| !reason.trim().is_empty());
        root.serialize_field(
            "cac:PaymentMeans",
            &payment_means(&data.payment_means_code, instruction_note),
        )?;

        for ac in &data.allowance_charges {
            root.serialize_field("cac:AllowanceCharge", &allowance_charge(ac, currency_code))?;
        }

        root.serialize_field(
            "cac:TaxTotal",
            &tax_total(totals.tax_total, currency_code, &[]),
        )?;
        root.serialize_field(
            "cac:TaxTotal",
            &tax_total(totals.tax_total, currency_code, &totals.subtotals),
        )?;

        root.serialize_field(
            "cac:LegalMonetaryTotal",
            &legal_monetary_total(totals, currency_code),
        )?;

        for (i, line) in data.line_items.iter().enumerate() {
            root.serialize_field(
                "cac:InvoiceLine",
                &InvoiceLineXml {
                    index: i + 1,
                    line,
                    currency: currency_code,
                },
            )?;
        }

        root.end()
    }
}
