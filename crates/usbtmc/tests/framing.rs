//! Framing and reassembly properties
//!
//! Exercises the bulk header codec and message reassembly against the
//! class-specification invariants: tag discipline, complement validation,
//! alignment, and the completion truth table over fragmented responses.

use proptest::prelude::*;
use usbtmc::header::ATTR_EOM;
use usbtmc::{BTag, FramingError, HEADER_SIZE, ReadAssembly, UsbTmcError, encode_dev_dep_out};

/// Build a device response first-transfer for the given declared length
fn response_transfer(tag: BTag, declared: u32, payload: &[u8], eom: bool) -> Vec<u8> {
    let mut frame = vec![2, tag.get(), !tag.get(), 0];
    frame.extend_from_slice(&declared.to_le_bytes());
    frame.extend_from_slice(&[if eom { ATTR_EOM } else { 0 }, 0, 0, 0]);
    frame.extend_from_slice(payload);
    frame
}

#[test]
fn test_header_roundtrip_recovers_tag() {
    for raw in [1u8, 2, 100, 255] {
        let tag = BTag::new(raw).expect("nonzero tag");
        let transfer = response_transfer(tag, 3, b"abc", true);
        let (state, payload) = ReadAssembly::begin(&transfer, tag).expect("decode failed");
        assert_eq!(payload, b"abc");
        assert!(state.is_complete());
    }
}

#[test]
fn test_corrupt_complement_is_rejected() {
    let tag = BTag::new(17).unwrap();
    let mut transfer = response_transfer(tag, 3, b"abc", true);
    transfer[2] ^= 0x10;
    let err = ReadAssembly::begin(&transfer, tag).unwrap_err();
    assert!(matches!(
        err,
        UsbTmcError::Framing(FramingError::BadTagComplement { .. })
    ));
}

#[test]
fn test_multi_fragment_completion_truth_table() {
    // Declared length 12, fragments of [4, 5, 3]; complete only after the
    // last fragment lands.
    let tag = BTag::new(9).unwrap();
    let transfer = response_transfer(tag, 12, b"0123", true);
    let (mut state, _) = ReadAssembly::begin(&transfer, tag).expect("begin failed");

    let fragments: [&[u8]; 2] = [b"45678", b"9ab"];
    let mut complete_flags = vec![state.is_complete()];
    for fragment in fragments {
        state.push(fragment);
        complete_flags.push(state.is_complete());
    }
    assert_eq!(complete_flags, vec![false, false, true]);
}

proptest! {
    /// The tag never becomes zero, from any start, over any walk length.
    #[test]
    fn prop_tag_never_zero(start in 1u8..=255, steps in 0usize..1000) {
        let mut tag = BTag::new(start).expect("nonzero start");
        for _ in 0..steps {
            tag = tag.next();
            prop_assert_ne!(tag.get(), 0);
        }
    }

    /// Tags advance by one, modulo the skipped zero.
    #[test]
    fn prop_tag_increments_by_one(start in 1u8..=255) {
        let tag = BTag::new(start).expect("nonzero start");
        let next = tag.next().get();
        if start == 255 {
            prop_assert_eq!(next, 1);
        } else {
            prop_assert_eq!(next, start + 1);
        }
    }

    /// Encoded frames are always 4-byte aligned and carry the payload
    /// verbatim after the 12-byte header.
    #[test]
    fn prop_out_frames_aligned(payload in proptest::collection::vec(any::<u8>(), 0..300), eom in any::<bool>()) {
        let frame = encode_dev_dep_out(BTag::INITIAL.next(), &payload, eom);
        prop_assert_eq!(frame.len() % 4, 0);
        prop_assert!(frame.len() >= HEADER_SIZE + payload.len());
        prop_assert_eq!(&frame[HEADER_SIZE..HEADER_SIZE + payload.len()], &payload[..]);
        // Padding is zeros.
        for &byte in &frame[HEADER_SIZE + payload.len()..] {
            prop_assert_eq!(byte, 0);
        }
    }

    /// For any fragmentation of a declared length with EOM on the header,
    /// completion is reached exactly when the last declared byte lands.
    #[test]
    fn prop_reassembly_completes_on_last_fragment(
        first_len in 0usize..40,
        rest in proptest::collection::vec(1usize..40, 0..6),
    ) {
        let declared = (first_len + rest.iter().sum::<usize>()) as u32;
        let tag = BTag::new(33).unwrap();
        let transfer = response_transfer(tag, declared, &vec![0xAAu8; first_len], true);

        let (mut state, payload) = ReadAssembly::begin(&transfer, tag).expect("begin failed");
        prop_assert_eq!(payload.len(), first_len);

        let mut consumed = first_len;
        prop_assert_eq!(state.is_complete(), consumed == declared as usize);

        for fragment_len in &rest {
            let fragment = vec![0xBBu8; *fragment_len];
            let chunk = state.push(&fragment);
            consumed += chunk.len();
            prop_assert_eq!(state.is_complete(), consumed == declared as usize);
        }
        prop_assert!(state.is_complete());
        prop_assert_eq!(state.remaining(), 0);
    }
}
