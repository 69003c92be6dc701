//! Shared key history, LATE-phase derivation, config hot-swap and
//! concurrent processing.

use std::sync::Arc;
use tagx_core::{FailureKind, KeyMaterial, Phase, Tag, TagxConfig};
use tagx_crypto::{KeyState, LayerCodec, XorCodec};
use tagx_engine::{process_with, HistoryRecord, KeyHistory, TagProcessor};

const LATE_PROFILE: &str = r#"
[[profiles]]
type_id = 502
name = "history_keyed"

[[profiles.markers]]
name = "bare"

[[profiles.layers]]
name = "xor"
method = "xor"
seeds = ["hex:1122334455667788"]
"#;

fn late_tag(accepted: &[KeyMaterial], offset: u64, plain: &[u8]) -> Tag {
    let seed = KeyMaterial::new(vec![0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    let late = KeyState::new(502, offset, seed)
        .advance_to(Phase::Late, accepted)
        .unwrap();
    let raw = XorCodec.encode(plain, late.current().as_bytes()).unwrap();
    Tag::new(502, offset, raw)
}

#[test]
fn late_phase_needs_and_uses_accepted_history() {
    let previous = KeyMaterial::new(b"previous".to_vec());
    let plain = b"payload keyed off every earlier acceptance";
    let tag = late_tag(std::slice::from_ref(&previous), 0x77, plain);

    let config = TagxConfig::from_toml_str(LATE_PROFILE).unwrap();

    let empty = TagProcessor::new(config.clone(), Arc::new(KeyHistory::in_memory()));
    let outcome = empty.process(&tag);
    assert!(matches!(
        outcome.failure,
        Some(FailureKind::KeyExhausted { .. })
    ));
    assert!(outcome
        .trace
        .entries
        .iter()
        .all(|e| e.hypothesis.phase != Phase::Late));

    let history = Arc::new(KeyHistory::in_memory());
    history
        .append(HistoryRecord::new(502, 0x10, 0, previous))
        .unwrap();
    let seeded = TagProcessor::new(config, history);
    let outcome = seeded.process(&tag);
    assert!(outcome.is_accepted(), "{:?}", outcome.failure);
    assert_eq!(outcome.phase, Some(Phase::Late));
    assert_eq!(outcome.plaintext.as_deref(), Some(&plain[..]));
}

#[test]
fn process_does_not_touch_history() {
    let processor = TagProcessor::with_defaults();
    let mut raw = vec![0, 0];
    raw.extend(XorCodec.encode(b"readable tag body text", &[0x55]).unwrap());
    let tag = Tag::new(233, 0x30, raw.clone());

    assert!(processor.process(&tag).is_accepted());
    assert!(processor.history().is_empty());
    assert_eq!(tag.raw_bytes(), raw.as_slice());
}

#[test]
fn accepted_keys_persist_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");

    let mut config = TagxConfig::default();
    config.history.record = true;
    config.history.path = Some(path.clone());

    {
        let history = Arc::new(KeyHistory::open(&path).unwrap());
        let processor = TagProcessor::new(config.clone(), history);
        let mut raw = vec![0, 0];
        raw.extend(XorCodec.encode(b"persist me across restarts", &[0xAA]).unwrap());
        let outcome = processor.process_and_record(&Tag::new(233, 0x4000, raw)).unwrap();
        assert!(outcome.is_accepted());
    }

    let reopened = KeyHistory::open(&path).unwrap();
    let snapshot = reopened.snapshot();
    let records = snapshot.records(233);
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].offset, 0x4000);
    assert_eq!(records[0].accepted_key.as_bytes(), &[0xAA]);
}

#[test]
fn reload_swaps_config_for_new_attempts_only() {
    let processor = TagProcessor::with_defaults();
    let raw = XorCodec
        .encode(
            b"only known after reload",
            b"\x11\x22\x33\x44\x55\x66\x77\x88",
        )
        .unwrap();
    let tag = Tag::new(502, 0, raw);

    let before = processor.config();
    assert!(matches!(
        processor.process(&tag).failure,
        Some(FailureKind::MarkerNotRecognized { .. })
    ));

    processor
        .reload(TagxConfig::from_toml_str(LATE_PROFILE).unwrap())
        .unwrap();
    let outcome = processor.process(&tag);
    assert!(outcome.is_accepted(), "{:?}", outcome.failure);

    // an attempt that started on the old snapshot still sees the old config
    let stale = process_with(&tag, &before, &processor.history().snapshot());
    assert!(matches!(
        stale.failure,
        Some(FailureKind::MarkerNotRecognized { .. })
    ));
}

#[test]
fn concurrent_processing_with_appends_and_reloads() {
    let mut config = TagxConfig::default();
    config.history.record = true;
    let processor = TagProcessor::new(config.clone(), Arc::new(KeyHistory::in_memory()));

    std::thread::scope(|s| {
        for worker in 0..4u64 {
            let processor = &processor;
            s.spawn(move || {
                for i in 0..20u64 {
                    let body = format!("worker {worker} tag {i} carries readable text");
                    let mut raw = vec![0, 0];
                    raw.extend(XorCodec.encode(body.as_bytes(), &[0xAA]).unwrap());
                    let tag = Tag::new(233, worker * 1000 + i, raw);
                    let outcome = processor.process_and_record(&tag).unwrap();
                    assert!(outcome.is_accepted(), "{:?}", outcome.failure);
                    assert_eq!(outcome.plaintext.as_deref(), Some(body.as_bytes()));
                }
            });
        }
        let processor = &processor;
        let config = config.clone();
        s.spawn(move || {
            for _ in 0..10 {
                processor.reload(config.clone()).unwrap();
            }
        });
    });

    assert_eq!(processor.history().snapshot().records(233).len(), 80);
}
