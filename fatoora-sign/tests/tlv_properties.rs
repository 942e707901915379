use fatoora_sign::tlv::{self, Tag, TlvError, MAX_VALUE_LEN};
use proptest::collection::vec;
use proptest::prelude::*;

fn records() -> impl Strategy<Value = Vec<(u8, Vec<u8>)>> {
    vec((any::<u8>(), vec(any::<u8>(), 0..=MAX_VALUE_LEN)), 0..12)
}

fn to_tags(records: &[(u8, Vec<u8>)]) -> Vec<Tag> {
    records
        .iter()
        .map(|(id, value)| Tag::new(*id, value.clone()).unwrap())
        .collect()
}

proptest! {
    #[test]
    fn decode_inverts_encode(records in records()) {
        let tags = to_tags(&records);
        let bytes = tlv::encode(&tags);
        let expected_len: usize = records.iter().map(|(_, v)| v.len() + 2).sum();
        prop_assert_eq!(bytes.len(), expected_len);
        prop_assert_eq!(tlv::decode(&bytes).unwrap(), tags);
    }

    #[test]
    fn cutting_inside_a_record_is_truncation(records in records(), cut in any::<prop::sample::Index>()) {
        let bytes = tlv::encode(&to_tags(&records));
        prop_assume!(!bytes.is_empty());

        let mut boundaries = vec![0];
        for (_, value) in &records {
            let last = *boundaries.last().unwrap();
            boundaries.push(last + 2 + value.len());
        }
        let at = cut.index(bytes.len());
        let result = tlv::decode(&bytes[..at]);
        if boundaries.contains(&at) {
            prop_assert!(result.is_ok());
        } else {
            let record_start = boundaries.iter().copied().filter(|b| *b < at).max().unwrap();
            prop_assert_eq!(result, Err(TlvError::TruncatedData { offset: record_start }));
            prop_assert!(!tlv::validate(&bytes[..at]));
        }
    }

    #[test]
    fn oversized_values_never_encode(len in (MAX_VALUE_LEN + 1)..1024usize, id in any::<u8>()) {
        let value = vec![0u8; len];
        prop_assert_eq!(
            tlv::encode_values(&[(id, value.as_slice())]),
            Err(TlvError::ValueTooLong { tag: id, len })
        );
    }
}
