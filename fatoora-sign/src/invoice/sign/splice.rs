//! Text-level edits on serialized invoices.
//!
//! The signature block and the QR reference are spliced into the generator
//! output as strings, then the whole document is re-parsed and re-indented
//! so both land with consistent whitespace.
use regex::{NoExpand, Regex};

use super::SigningError;
use crate::dom::{Document, ParseOptions, WriteOptions, XmlError};
use crate::invoice::xml::constants::{CAC_SIGNATURE_TEMPLATE, QR_PLACEHOLDER, QR_REFERENCE_TEMPLATE};

const PROFILE_ID_ANCHOR: &str = "<cbc:ProfileID>";
const SUPPLIER_ANCHOR: &str = "<cac:AccountingSupplierParty>";
const EXTENSIONS_OPEN: &str = "<ext:UBLExtensions>";
const EXTENSIONS_CLOSE: &str = "</ext:UBLExtensions>";

/// The QR `cac:AdditionalDocumentReference` holding `qr`.
pub(crate) fn qr_reference(qr: &str) -> String {
    QR_REFERENCE_TEMPLATE.replace(QR_PLACEHOLDER, qr)
}

/// Insert the signature block before `<cbc:ProfileID>` and the QR reference
/// plus the `cac:Signature` placeholder before
/// `<cac:AccountingSupplierParty>`.
pub(crate) fn insert_signature_blocks(
    xml: &str,
    extensions: &str,
    qr: &str,
) -> Result<String, SigningError> {
    let profile_at = xml
        .find(PROFILE_ID_ANCHOR)
        .ok_or(SigningError::SpliceAnchorMissing("cbc:ProfileID"))?;
    let supplier_at = xml
        .find(SUPPLIER_ANCHOR)
        .ok_or(SigningError::SpliceAnchorMissing("cac:AccountingSupplierParty"))?;
    if supplier_at < profile_at {
        return Err(SigningError::SpliceAnchorMissing("cbc:ProfileID"));
    }

    let qr_reference = qr_reference(qr);
    let mut out = String::with_capacity(
        xml.len() + extensions.len() + qr_reference.len() + CAC_SIGNATURE_TEMPLATE.len(),
    );
    out.push_str(&xml[..profile_at]);
    out.push_str(extensions);
    out.push_str(&xml[profile_at..supplier_at]);
    out.push_str(&qr_reference);
    out.push_str(CAC_SIGNATURE_TEMPLATE);
    out.push_str(&xml[supplier_at..]);
    Ok(out)
}

/// Re-parse without blank text and pretty-print with `indent` spaces.
///
/// Lines strictly inside `ext:UBLExtensions` are shifted left by one
/// indent level. That region is excluded from the invoice digest.
pub(crate) fn reformat(xml: &str, indent: usize) -> Result<String, XmlError> {
    let doc = Document::parse_with(xml, ParseOptions::drop_blank_text())?;
    let pretty = doc.to_xml_string(&WriteOptions::pretty(indent));
    let collapsed = collapse_blank_line_before_extensions(&pretty);
    Ok(dedent_extensions(&collapsed, indent))
}

fn collapse_blank_line_before_extensions(xml: &str) -> String {
    let Some(open) = xml.find(EXTENSIONS_OPEN) else {
        return xml.to_string();
    };
    let head = &xml[..open];
    let line_start = head.rfind('\n').map_or(0, |i| i + 1);
    let (before, indentation) = head.split_at(line_start);
    let trimmed = before.trim_end_matches(|c: char| c == '\n' || c == ' ' || c == '\t');
    if trimmed.len() == before.len() || trimmed.is_empty() {
        return xml.to_string();
    }
    format!("{trimmed}\n{indentation}{}", &xml[open..])
}

fn dedent_extensions(xml: &str, indent: usize) -> String {
    let unit = " ".repeat(indent);
    let mut inside = false;
    let mut lines = Vec::new();
    for line in xml.split('\n') {
        if line.contains(EXTENSIONS_CLOSE) {
            inside = false;
        }
        match line.strip_prefix(unit.as_str()) {
            Some(stripped) if inside => lines.push(stripped),
            _ => lines.push(line),
        }
        if line.contains(EXTENSIONS_OPEN) && !line.contains(EXTENSIONS_CLOSE) {
            inside = true;
        }
    }
    lines.join("\n")
}

/// Swap the whole `ext:UBLExtensions` block for `extensions`.
pub(crate) fn replace_extensions(xml: &str, extensions: &str) -> Result<String, SigningError> {
    let block = Regex::new(r"(?s)<ext:UBLExtensions>.*?</ext:UBLExtensions>")?;
    if !block.is_match(xml) {
        return Err(SigningError::SpliceAnchorMissing("ext:UBLExtensions"));
    }
    Ok(block.replace(xml, NoExpand(extensions)).into_owned())
}

/// Replace the embedded QR value, tolerating whitespace around it when the
/// exact text is not found.
pub(crate) fn replace_qr_value(xml: &str, old: &str, new: &str) -> Result<String, SigningError> {
    let exact = format!(">{old}</cbc:EmbeddedDocumentBinaryObject>");
    if let Some(at) = xml.find(&exact) {
        let mut out = String::with_capacity(xml.len() + new.len());
        out.push_str(&xml[..at]);
        out.push('>');
        out.push_str(new);
        out.push_str(&xml[at + 1 + old.len()..]);
        return Ok(out);
    }

    let pattern = format!(
        r"(<cbc:EmbeddedDocumentBinaryObject[^>]*>)\s*{}\s*(</cbc:EmbeddedDocumentBinaryObject>)",
        regex::escape(old)
    );
    let value = Regex::new(&pattern)?;
    let captures = value
        .captures(xml)
        .ok_or(SigningError::SpliceAnchorMissing("QR EmbeddedDocumentBinaryObject"))?;
    let (Some(whole), Some(open), Some(close)) = (captures.get(0), captures.get(1), captures.get(2))
    else {
        return Err(SigningError::SpliceAnchorMissing(
            "QR EmbeddedDocumentBinaryObject",
        ));
    };
    Ok(format!(
        "{}{}{new}{}{}",
        &xml[..whole.start()],
        open.as_str(),
        close.as_str(),
        &xml[whole.end()..]
    ))
}
