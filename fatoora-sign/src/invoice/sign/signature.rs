//! The `ext:UBLExtensions` block carrying the XAdES signature.
use chrono::{DateTime, Utc};
use quick_xml::escape::partial_escape;

use crate::certificate::Certificate;
use crate::digest::sha256_hex_base64;
use crate::dom::{Document, NodeId, WriteOptions, XmlError};
use crate::invoice::xml::constants::{
    DS_NS, SAC_NS, SBC_NS, SIGNATURE_ID, SIGNATURE_METHOD, SIG_NS, XADES_NS,
};

const C14N11: &str = "http://www.w3.org/2006/12/xml-c14n11";
const ECDSA_SHA256: &str = "http://www.w3.org/2001/04/xmldsig-more#ecdsa-sha256";
const XPATH_TRANSFORM: &str = "http://www.w3.org/TR/1999/REC-xpath-19991116";
const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";
const SIGNATURE_PROPERTIES_TYPE: &str = "http://www.w3.org/2000/09/xmldsig#SignatureProperties";
const SIGNATURE_INFORMATION_ID: &str = "urn:oasis:names:specification:ubl:signature:1";

const EXCLUDED_FROM_DIGEST: [&str; 3] = [
    "not(//ancestor-or-self::ext:UBLExtensions)",
    "not(//ancestor-or-self::cac:Signature)",
    "not(//ancestor-or-self::cac:AdditionalDocumentReference[cbc:ID='QR'])",
];

pub(crate) const SIGNING_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Hashed byte for byte; whitespace is part of the digest.
pub const SIGNED_PROPERTIES_TEMPLATE: &str = r#"<xades:SignedProperties xmlns:xades="http://uri.etsi.org/01903/v1.3.2#" Id="xadesSignedProperties">
                                    <xades:SignedSignatureProperties>
                                        <xades:SigningTime>SET_SIGN_TIMESTAMP</xades:SigningTime>
                                        <xades:SigningCertificate>
                                            <xades:Cert>
                                                <xades:CertDigest>
                                                    <ds:DigestMethod xmlns:ds="http://www.w3.org/2000/09/xmldsig#" Algorithm="http://www.w3.org/2001/04/xmlenc#sha256"/>
                                                    <ds:DigestValue xmlns:ds="http://www.w3.org/2000/09/xmldsig#">SET_CERTIFICATE_HASH</ds:DigestValue>
                                                </xades:CertDigest>
                                                <xades:IssuerSerial>
                                                    <ds:X509IssuerName xmlns:ds="http://www.w3.org/2000/09/xmldsig#">SET_CERTIFICATE_ISSUER</ds:X509IssuerName>
                                                    <ds:X509SerialNumber xmlns:ds="http://www.w3.org/2000/09/xmldsig#">SET_CERTIFICATE_SERIAL_NUMBER</ds:X509SerialNumber>
                                                </xades:IssuerSerial>
                                            </xades:Cert>
                                        </xades:SigningCertificate>
                                    </xades:SignedSignatureProperties>
                                </xades:SignedProperties>"#;

pub(crate) fn format_signing_time(time: &DateTime<Utc>) -> String {
    time.format(SIGNING_TIME_FORMAT).to_string()
}

/// Fill the SignedProperties template. Values are escaped the way the
/// signature block writes its text nodes.
pub fn signed_properties_xml(
    signing_time: &str,
    cert_digest: &str,
    issuer: &str,
    serial: &str,
) -> String {
    SIGNED_PROPERTIES_TEMPLATE
        .replace("SET_SIGN_TIMESTAMP", &partial_escape(signing_time))
        .replace("SET_CERTIFICATE_HASH", &partial_escape(cert_digest))
        .replace("SET_CERTIFICATE_ISSUER", &partial_escape(issuer))
        .replace("SET_CERTIFICATE_SERIAL_NUMBER", &partial_escape(serial))
        .replace("\r\n", "\n")
}

/// Reference digest of the filled template.
pub fn signed_properties_digest(
    signing_time: &str,
    cert_digest: &str,
    issuer: &str,
    serial: &str,
) -> String {
    sha256_hex_base64(signed_properties_xml(signing_time, cert_digest, issuer, serial).as_bytes())
}

/// Values that go into one signature block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SignatureBlock<'a> {
    pub invoice_digest: &'a str,
    pub signature_value: &'a str,
    pub signed_props_digest: &'a str,
    pub signing_time: &'a str,
}

/// Build the `ext:UBLExtensions` element as text.
///
/// `ext:` and `cbc:` are left undeclared; the enclosing invoice binds them
/// once the block is spliced in.
pub(crate) fn build_signature_xml(
    block: SignatureBlock<'_>,
    cert: &Certificate,
    indent: usize,
) -> Result<String, XmlError> {
    let mut doc = Document::new();
    let extensions = doc.create_element("ext:UBLExtensions");
    doc.append_child(doc.document_node(), extensions)?;
    let extension = doc.append_element(extensions, "ext:UBLExtension")?;
    doc.append_text_element(extension, "ext:ExtensionURI", SIGNATURE_METHOD)?;
    let content = doc.append_element(extension, "ext:ExtensionContent")?;

    let signatures = doc.append_element(content, "sig:UBLDocumentSignatures")?;
    doc.set_attribute(signatures, "xmlns:sig", SIG_NS)?;
    doc.set_attribute(signatures, "xmlns:sac", SAC_NS)?;
    doc.set_attribute(signatures, "xmlns:sbc", SBC_NS)?;
    let information = doc.append_element(signatures, "sac:SignatureInformation")?;
    doc.append_text_element(information, "cbc:ID", SIGNATURE_INFORMATION_ID)?;
    doc.append_text_element(information, "sbc:ReferencedSignatureID", SIGNATURE_ID)?;

    let signature = doc.append_element(information, "ds:Signature")?;
    doc.set_attribute(signature, "xmlns:ds", DS_NS)?;
    doc.set_attribute(signature, "Id", "signature")?;

    append_signed_info(&mut doc, signature, block)?;
    doc.append_text_element(signature, "ds:SignatureValue", block.signature_value)?;
    let key_info = doc.append_element(signature, "ds:KeyInfo")?;
    let x509_data = doc.append_element(key_info, "ds:X509Data")?;
    doc.append_text_element(x509_data, "ds:X509Certificate", cert.as_base64())?;

    let object = doc.append_element(signature, "ds:Object")?;
    append_qualifying_properties(&mut doc, object, cert, block.signing_time)?;

    Ok(doc.node_to_xml_string(extensions, &WriteOptions::pretty(indent).without_declaration()))
}

fn algorithm(doc: &mut Document, parent: NodeId, name: &str, uri: &str) -> Result<NodeId, XmlError> {
    let id = doc.append_element(parent, name)?;
    doc.set_attribute(id, "Algorithm", uri)?;
    Ok(id)
}

fn append_signed_info(
    doc: &mut Document,
    signature: NodeId,
    block: SignatureBlock<'_>,
) -> Result<(), XmlError> {
    let signed_info = doc.append_element(signature, "ds:SignedInfo")?;
    algorithm(doc, signed_info, "ds:CanonicalizationMethod", C14N11)?;
    algorithm(doc, signed_info, "ds:SignatureMethod", ECDSA_SHA256)?;

    let invoice_ref = doc.append_element(signed_info, "ds:Reference")?;
    doc.set_attribute(invoice_ref, "Id", "invoiceSignedData")?;
    doc.set_attribute(invoice_ref, "URI", "")?;
    let transforms = doc.append_element(invoice_ref, "ds:Transforms")?;
    for expression in EXCLUDED_FROM_DIGEST {
        let transform = algorithm(doc, transforms, "ds:Transform", XPATH_TRANSFORM)?;
        doc.append_text_element(transform, "ds:XPath", expression)?;
    }
    algorithm(doc, transforms, "ds:Transform", C14N11)?;
    algorithm(doc, invoice_ref, "ds:DigestMethod", SHA256)?;
    doc.append_text_element(invoice_ref, "ds:DigestValue", block.invoice_digest)?;

    let props_ref = doc.append_element(signed_info, "ds:Reference")?;
    doc.set_attribute(props_ref, "Type", SIGNATURE_PROPERTIES_TYPE)?;
    doc.set_attribute(props_ref, "URI", "#xadesSignedProperties")?;
    algorithm(doc, props_ref, "ds:DigestMethod", SHA256)?;
    doc.append_text_element(props_ref, "ds:DigestValue", block.signed_props_digest)?;
    Ok(())
}

fn append_qualifying_properties(
    doc: &mut Document,
    object: NodeId,
    cert: &Certificate,
    signing_time: &str,
) -> Result<(), XmlError> {
    let qualifying = doc.append_element(object, "xades:QualifyingProperties")?;
    doc.set_attribute(qualifying, "xmlns:xades", XADES_NS)?;
    doc.set_attribute(qualifying, "Target", "signature")?;
    let signed_properties = doc.append_element(qualifying, "xades:SignedProperties")?;
    doc.set_attribute(signed_properties, "Id", "xadesSignedProperties")?;
    let signature_properties =
        doc.append_element(signed_properties, "xades:SignedSignatureProperties")?;
    doc.append_text_element(signature_properties, "xades:SigningTime", signing_time)?;

    let signing_certificate =
        doc.append_element(signature_properties, "xades:SigningCertificate")?;
    let cert_node = doc.append_element(signing_certificate, "xades:Cert")?;
    let cert_digest = doc.append_element(cert_node, "xades:CertDigest")?;
    algorithm(doc, cert_digest, "ds:DigestMethod", SHA256)?;
    doc.append_text_element(cert_digest, "ds:DigestValue", &cert.cert_digest())?;
    let issuer_serial = doc.append_element(cert_node, "xades:IssuerSerial")?;
    doc.append_text_element(issuer_serial, "ds:X509IssuerName", cert.issuer_name())?;
    doc.append_text_element(
        issuer_serial,
        "ds:X509SerialNumber",
        cert.serial_number_decimal(),
    )?;
    Ok(())
}
