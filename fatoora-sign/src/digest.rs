//! SHA-256 digest encodings used by the signature block.
use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// `base64(SHA-256(data))`, the shape of the invoice digest.
pub fn sha256_base64(data: &[u8]) -> String {
    Base64::encode_string(&Sha256::digest(data))
}

/// `base64(hex(SHA-256(data)))`, the shape of the certificate and
/// signed-properties digests.
pub fn sha256_hex_base64(data: &[u8]) -> String {
    hex_hash_to_base64(&Sha256::digest(data))
}

fn hex_hash_to_base64(hash: &[u8]) -> String {
    let mut hex_hash = String::with_capacity(hash.len() * 2);
    for byte in hash {
        let _ = write!(&mut hex_hash, "{:02x}", byte);
    }
    Base64::encode_string(hex_hash.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_digest_of_empty_input() {
        assert_eq!(
            sha256_base64(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn hex_digest_is_base64_of_lowercase_hex() {
        let encoded = sha256_hex_base64(b"");
        let decoded = Base64::decode_vec(&encoded).unwrap();
        assert_eq!(
            String::from_utf8(decoded).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(encoded.len(), 88);
    }
}
