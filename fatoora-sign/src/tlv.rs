//! Tag-Length-Value codec used by the QR payload.
//!
//! Every record is `[tag][len][value...]` with a one byte tag and a one byte
//! length, so a single value carries at most 255 bytes.
use thiserror::Error;

/// Largest value a single record can carry.
pub const MAX_VALUE_LEN: usize = u8::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    #[error("TLV field {tag} exceeds 255 bytes (len={len})")]
    ValueTooLong { tag: u8, len: usize },
    #[error("truncated TLV data at offset {offset}")]
    TruncatedData { offset: usize },
}

/// A single TLV record.
///
/// # Examples
/// ```rust
/// use fatoora_sign::tlv::{self, Tag};
///
/// let tag = Tag::new(1, "Acme SA")?;
/// let bytes = tlv::encode(&[tag.clone()]);
/// assert_eq!(bytes[..2], [1, 7]);
/// assert_eq!(tlv::decode(&bytes)?, vec![tag]);
/// # Ok::<(), fatoora_sign::tlv::TlvError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    id: u8,
    value: Vec<u8>,
}

impl Tag {
    /// # Errors
    /// Returns [`TlvError::ValueTooLong`] when `value` exceeds [`MAX_VALUE_LEN`].
    pub fn new(id: u8, value: impl Into<Vec<u8>>) -> Result<Self, TlvError> {
        let value = value.into();
        if value.len() > MAX_VALUE_LEN {
            return Err(TlvError::ValueTooLong {
                tag: id,
                len: value.len(),
            });
        }
        Ok(Self { id, value })
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Value interpreted as UTF-8, if it is valid.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }

    pub fn into_parts(self) -> (u8, Vec<u8>) {
        (self.id, self.value)
    }

    fn encoded_len(&self) -> usize {
        2 + self.value.len()
    }
}

/// Concatenate tags in the order given.
pub fn encode(tags: &[Tag]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tags.iter().map(Tag::encoded_len).sum());
    for tag in tags {
        out.push(tag.id);
        // bounded by Tag::new
        out.push(tag.value.len() as u8);
        out.extend_from_slice(&tag.value);
    }
    out
}

/// Encode raw `(tag, value)` pairs, checking lengths as it goes.
///
/// # Errors
/// Returns [`TlvError::ValueTooLong`] for the first value over the limit.
pub fn encode_values(values: &[(u8, &[u8])]) -> Result<Vec<u8>, TlvError> {
    let tags = values
        .iter()
        .map(|(id, value)| Tag::new(*id, *value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encode(&tags))
}

/// Sequentially scan a TLV buffer.
///
/// # Errors
/// Returns [`TlvError::TruncatedData`] if a header or a value runs past the
/// end of `bytes`.
pub fn decode(bytes: &[u8]) -> Result<Vec<Tag>, TlvError> {
    let mut tags = Vec::new();
    let mut offset = 0;
    while offset < bytes.len() {
        let header = bytes
            .get(offset..offset + 2)
            .ok_or(TlvError::TruncatedData { offset })?;
        let (id, len) = (header[0], header[1] as usize);
        let start = offset + 2;
        let value = bytes
            .get(start..start + len)
            .ok_or(TlvError::TruncatedData { offset })?;
        tags.push(Tag {
            id,
            value: value.to_vec(),
        });
        offset = start + len;
    }
    Ok(tags)
}

/// Structural check only; tag meanings are not inspected.
pub fn validate(bytes: &[u8]) -> bool {
    decode(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_preserves_order_and_lengths() {
        let tags = vec![
            Tag::new(1, "Acme SA").unwrap(),
            Tag::new(2, "300000000000003").unwrap(),
            Tag::new(8, vec![0x30, 0x56]).unwrap(),
        ];
        let bytes = encode(&tags);
        assert_eq!(&bytes[..9], &[1, 7, b'A', b'c', b'm', b'e', b' ', b'S', b'A']);
        assert_eq!(bytes[9], 2);
        assert_eq!(bytes[10], 15);
        assert_eq!(&bytes[bytes.len() - 4..], &[8, 2, 0x30, 0x56]);
    }

    #[test]
    fn value_at_limit_is_accepted() {
        let tag = Tag::new(6, vec![b'x'; MAX_VALUE_LEN]).unwrap();
        let bytes = encode(&[tag]);
        assert_eq!(bytes[1], 255);
        assert_eq!(bytes.len(), 257);
    }

    #[test]
    fn oversized_value_is_rejected() {
        let err = Tag::new(6, vec![0u8; 256]).unwrap_err();
        assert_eq!(err, TlvError::ValueTooLong { tag: 6, len: 256 });

        let long = vec![1u8; 300];
        let err = encode_values(&[(1, b"ok"), (7, &long)]).unwrap_err();
        assert_eq!(err, TlvError::ValueTooLong { tag: 7, len: 300 });
    }

    #[test]
    fn decode_reports_truncated_value() {
        let err = decode(&[1, 5, b'a', b'b']).unwrap_err();
        assert_eq!(err, TlvError::TruncatedData { offset: 0 });
    }

    #[test]
    fn decode_reports_truncated_header() {
        let err = decode(&[1, 1, b'a', 2]).unwrap_err();
        assert_eq!(err, TlvError::TruncatedData { offset: 3 });
        assert!(!validate(&[1, 1, b'a', 2]));
    }

    #[test]
    fn empty_buffer_is_valid() {
        assert!(validate(&[]));
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn zero_length_values_round_trip() {
        let bytes = [3, 0, 4, 1, b'z'];
        let tags = decode(&bytes).unwrap();
        assert_eq!(tags.len(), 2);
        assert!(tags[0].value().is_empty());
        assert_eq!(tags[1].as_str(), Some("z"));
        assert_eq!(encode(&tags), bytes);
    }
}
