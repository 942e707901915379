pub(crate) const INVOICE_NS: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
pub(crate) const CBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
pub(crate) const CAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
pub(crate) const EXT_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
pub(crate) const SIG_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:CommonSignatureComponents-2";
pub(crate) const SAC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:SignatureAggregateComponents-2";
pub(crate) const SBC_NS: &str =
    "urn:oasis:names:specification:ubl:schema:xsd:SignatureBasicComponents-2";
pub(crate) const DS_NS: &str = "http://www.w3.org/2000/09/xmldsig#";
pub(crate) const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// Prefixes every signing-side path query may use.
pub(crate) const PREFIXES: [(&str, &str); 9] = [
    ("ubl", INVOICE_NS),
    ("cbc", CBC_NS),
    ("cac", CAC_NS),
    ("ext", EXT_NS),
    ("sig", SIG_NS),
    ("sac", SAC_NS),
    ("sbc", SBC_NS),
    ("ds", DS_NS),
    ("xades", XADES_NS),
];

pub(crate) const SIGNATURE_ID: &str = "urn:oasis:names:specification:ubl:signature:Invoice";
pub(crate) const SIGNATURE_METHOD: &str = "urn:oasis:names:specification:ubl:dsig:enveloped:xades";
pub(crate) const QR_PLACEHOLDER: &str = "SET_QR_CODE_DATA";

pub(crate) const QR_REFERENCE_TEMPLATE: &str = "<cac:AdditionalDocumentReference>\
<cbc:ID>QR</cbc:ID>\
<cac:Attachment>\
<cbc:EmbeddedDocumentBinaryObject mimeCode=\"text/plain\">SET_QR_CODE_DATA</cbc:EmbeddedDocumentBinaryObject>\
</cac:Attachment>\
</cac:AdditionalDocumentReference>";

pub(crate) const CAC_SIGNATURE_TEMPLATE: &str = "<cac:Signature>\
<cbc:ID>urn:oasis:names:specification:ubl:signature:Invoice</cbc:ID>\
<cbc:SignatureMethod>urn:oasis:names:specification:ubl:dsig:enveloped:xades</cbc:SignatureMethod>\
</cac:Signature>";
