//! JSON body for reporting, clearance and compliance submissions.
use serde::{Deserialize, Serialize};

/// `{invoice, invoiceHash, uuid}` with the signed XML base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    invoice: String,
    invoice_hash: String,
    uuid: String,
}

impl SubmissionPayload {
    pub fn new(invoice: String, invoice_hash: &str, uuid: &str) -> Self {
        Self {
            invoice,
            invoice_hash: invoice_hash.to_string(),
            uuid: uuid.to_string(),
        }
    }

    pub fn invoice(&self) -> &str {
        &self.invoice
    }

    pub fn invoice_hash(&self) -> &str {
        &self.invoice_hash
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn serializes_with_camel_case_keys() {
        let payload = SubmissionPayload::new("PEludm9pY2UvPg==".into(), "aGFzaA==", "u-1");
        assert_eq!(
            payload.to_json().unwrap(),
            r#"{"invoice":"PEludm9pY2UvPg==","invoiceHash":"aGFzaA==","uuid":"u-1"}"#
        );
        let parsed: SubmissionPayload =
            serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(parsed, payload);
    }
}
