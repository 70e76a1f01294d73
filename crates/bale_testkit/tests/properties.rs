//! Property tests for framing, commitments and packing.

use bale_codec::archive::{section_len, Section, SectionReader};
use bale_core::{pack, piece_commitment, PackConfig, Retriever, Segmentor, SegmentorConfig};
use bale_testkit::prelude::*;
use proptest::prelude::*;
use std::io::Cursor;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn section_round_trip(payload in payload_strategy(2048)) {
        let section = Section::new(payload.clone());
        let encoded = section.encode();
        prop_assert_eq!(encoded.len() as u64, section_len(payload.len() as u64));

        let (parsed, consumed) = Section::parse(&encoded).unwrap();
        prop_assert_eq!(consumed, encoded.len());
        prop_assert_eq!(&parsed.payload, &payload);
        prop_assert!(parsed.verify().is_ok());
    }

    #[test]
    fn short_inputs_commit_to_minimum(payload in payload_strategy(100)) {
        let info = piece_commitment(&payload).unwrap();
        prop_assert_eq!(info.size.get(), 128);
    }

    #[test]
    fn segmentation_preserves_payload(
        payload in payload_strategy(4096),
        chunk in chunk_size_strategy(),
    ) {
        let fixture = TestSegmentor::memory_with(SegmentorConfig::new().chunk_size(chunk));
        let segment = fixture.store_bytes(&payload);
        prop_assert_eq!(segment.raw_size, payload.len() as u64);

        let mut out = Vec::new();
        fixture.copy_payload(segment.cid(), &mut out).unwrap();
        prop_assert_eq!(out, payload);
    }

    #[test]
    fn pack_is_deterministic(segments in segments_strategy(14, 12)) {
        let config = PackConfig::new().capacity(1 << 15).max_pieces(3);
        let first = pack(segments.clone(), &config).unwrap();
        let second = pack(segments, &config).unwrap();

        let cids = |o: &bale_core::PackOutcome| -> Vec<String> {
            o.pieces.iter().map(|p| p.cid().to_string()).collect()
        };
        prop_assert_eq!(cids(&first), cids(&second));
        prop_assert_eq!(first.leftover.len(), second.leftover.len());
    }

    #[test]
    fn pieces_fit_capacity(segments in segments_strategy(16, 12), exp in 10u32..=16) {
        let capacity = 1u64 << exp;
        let config = PackConfig::new().capacity(capacity).max_pieces(4);
        let total = segments.len();
        let outcome = pack(segments, &config).unwrap();

        let mut placed = 0;
        for piece in &outcome.pieces {
            prop_assert!(piece.used <= capacity);
            prop_assert!(piece.size().get().is_power_of_two());
            prop_assert!(piece.size().get() >= piece.used);
            prop_assert!(piece.size().get() <= capacity);
            placed += piece.payload_segments().count();
        }
        prop_assert_eq!(placed + outcome.leftover.len(), total);
    }

    #[test]
    fn oversized_segments_are_leftover(exp in 10u32..=14) {
        let capacity = 1u64 << exp;
        let segments = synthetic_segments(&[capacity, capacity * 2, 128]);
        let outcome = pack(segments, &PackConfig::new().capacity(capacity).max_pieces(2)).unwrap();

        let leftover: Vec<u64> = outcome.leftover.iter().map(|s| s.size().get()).collect();
        prop_assert!(leftover.contains(&capacity));
        prop_assert!(leftover.contains(&(capacity * 2)));
        prop_assert_eq!(outcome.pieces.len(), 1);
    }
}

#[test]
fn sections_stream_from_stored_archive() {
    let fixture = TestSegmentor::file_with(SegmentorConfig::new().chunk_size(100));
    let data = sample_data(1050, 9);
    let segment = fixture.store_bytes(&data);

    let mut archive = Vec::new();
    std::io::copy(&mut fixture.retrieve(segment.cid()).unwrap(), &mut archive).unwrap();
    let sections: Vec<Section> = SectionReader::new(Cursor::new(archive), 100)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(sections.len(), 11);
    assert_eq!(sections[10].payload.len(), 50);
    assert_eq!(fixture.list_segments().unwrap().len(), 1);
}
