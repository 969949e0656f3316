use crate::*;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use shopsignal_core::config::CaptureConfig;
use shopsignal_core::sink::EventLogSink;
use shopsignal_core::types::{PatchKind, PatchOp};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const PRODUCT_URL: &str = "https://chatgpt.com/backend-api/search/product_info?q=kettle";

#[derive(Default)]
struct RecordingSink {
    records: parking_lot::Mutex<Vec<serde_json::Value>>,
    reject: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingSink {
    fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().clone()
    }

    fn events(&self, i: usize) -> usize {
        self.records()[i]["events"].as_array().map_or(0, Vec::len)
    }
}

#[async_trait]
impl EventLogSink for RecordingSink {
    async fn save(&self, record: &serde_json::Value) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return false;
        }
        self.records.lock().push(record.clone());
        true
    }
}

fn card(text: &str) -> ClickTarget {
    ClickTarget {
        interactive: true,
        markup: r#"<div data-testid="product-card">"#.into(),
        carousel_item: false,
        text: text.into(),
    }
}

fn marker() -> PatchOp {
    PatchOp::new("/type", PatchKind::Replace, json!("product_entity"))
}

fn machine() -> CaptureMachine {
    CaptureMachine::new(&CaptureConfig::default())
}

fn frame(ops: serde_json::Value) -> String {
    format!("event: delta\ndata: {}\n\n", json!({ "v": ops }))
}

fn controller() -> (CaptureController, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    (CaptureController::new(&CaptureConfig::default(), sink.clone()), sink)
}

// ========== Click Qualification ==========

#[test]
fn test_hint_first_three_lines() {
    let t = card("Kettle Pro\n₹1,299\n4.5 stars\nFree delivery");
    assert_eq!(t.hint(), "Kettle Pro ₹1,299 4.5 stars");
}

#[test]
fn test_hint_bounded() {
    let t = card(&"x".repeat(500));
    assert_eq!(t.hint().chars().count(), 200);
}

#[test]
fn test_non_interactive_rejected() {
    let mut t = card("Kettle Pro with a long name");
    t.interactive = false;
    assert!(!t.qualifies());
}

#[test]
fn test_short_text_needs_carousel() {
    let t = card("Go");
    assert!(!t.qualifies());
    let t = ClickTarget {
        interactive: true,
        markup: r#"<div class="Carousel-track">"#.into(),
        carousel_item: false,
        text: "Go".into(),
    };
    assert!(t.qualifies());
    let t = ClickTarget { carousel_item: true, ..card("") };
    assert!(t.qualifies());
}

// ========== State Machine ==========

#[test]
fn test_arm_starts_session() {
    let mut m = machine();
    let now = Instant::now();
    let outcome = m.arm(&card("Kettle Pro 1.7L"), "/c/abc-1", Utc::now(), now);
    assert!(matches!(outcome, ArmOutcome::Started { superseded: None, .. }));
    assert!(m.is_capturing(now));
    let s = m.session().unwrap();
    assert_eq!(s.conversation_id.as_deref(), Some("abc-1"));
    assert_eq!(s.hint, "Kettle Pro 1.7L");
}

#[test]
fn test_arm_not_qualified() {
    let mut m = machine();
    let outcome = m.arm(&card("ok"), "/c/abc", Utc::now(), Instant::now());
    assert_eq!(outcome, ArmOutcome::NotQualified);
    assert!(m.session().is_none());
}

#[test]
fn test_overlapping_click_ignored() {
    let mut m = machine();
    let now = Instant::now();
    let first = match m.arm(&card("First product"), "/c/a", Utc::now(), now) {
        ArmOutcome::Started { session_id, .. } => session_id,
        other => panic!("unexpected {other:?}"),
    };
    let second = m.arm(&card("Second product"), "/c/a", Utc::now(), now + Duration::from_secs(5));
    assert_eq!(second, ArmOutcome::AlreadyCapturing { session_id: first });
    assert_eq!(m.session().unwrap().hint, "First product");
}

#[test]
fn test_click_after_expiry_supersedes() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("First product"), "/c/a", Utc::now(), now);
    let later = now + Duration::from_secs(31);
    match m.arm(&card("Second product"), "/c/a", Utc::now(), later) {
        ArmOutcome::Started { superseded: Some(record), .. } => {
            assert_eq!(record.product_hint, "First product");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(m.session().unwrap().hint, "Second product");
}

#[test]
fn test_batch_without_entity_dropped() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/a", Utc::now(), now);
    let kept = m.observe_batch(vec![PatchOp::new("", PatchKind::Append, json!({"a": 1}))], now);
    assert_eq!(kept, 0);
    assert!(m.session().unwrap().collected.is_empty());
}

#[test]
fn test_entity_batch_filtered() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/a", Utc::now(), now);
    let ops = vec![
        marker(),
        PatchOp::new("", PatchKind::Append, json!({"title": "Kettle"})),
        PatchOp::new("/data", PatchKind::Remove, json!(null)),
        PatchOp::new("/title", PatchKind::Append, json!(" Pro")),
        PatchOp::new("/data", PatchKind::Replace, json!([])),
    ];
    assert_eq!(m.observe_batch(ops, now), 3);
    let s = m.session().unwrap();
    assert_eq!(s.collected.len(), 1);
    assert_eq!(s.collected[0].kind, "patch");
    assert_eq!(s.collected[0].ops.len(), 3);
}

#[test]
fn test_entity_mode_window() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/a", Utc::now(), now);
    m.observe_batch(vec![marker()], now);

    let root_append = || vec![PatchOp::new("", PatchKind::Append, json!({"n": 1}))];
    assert_eq!(m.observe_batch(root_append(), now + Duration::from_secs(7)), 1);
    assert_eq!(m.observe_batch(root_append(), now + Duration::from_secs(9)), 0);
}

#[test]
fn test_entity_mode_refreshed() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/a", Utc::now(), now);
    m.observe_batch(vec![marker()], now);
    m.observe_batch(vec![marker()], now + Duration::from_secs(6));
    let until = m.session().unwrap().entity_mode_until.unwrap();
    assert_eq!(until, now + Duration::from_secs(14));
    let kept = m.observe_batch(
        vec![PatchOp::new("/data", PatchKind::Remove, json!(null))],
        now + Duration::from_secs(12),
    );
    assert_eq!(kept, 1);
}

#[test]
fn test_observe_after_expiry_ignored() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/a", Utc::now(), now);
    assert_eq!(m.observe_batch(vec![marker()], now + Duration::from_secs(31)), 0);
}

#[test]
fn test_flush_empty_events_not_suppressed() {
    let mut m = machine();
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), Instant::now());
    let record = m.flush().expect("record");
    assert!(record.events.is_empty());
    assert_eq!(record.source, "chatgpt-extension");
    assert_eq!(record.conversation_id.as_deref(), Some("abc"));
}

#[test]
fn test_flush_idempotent() {
    let mut m = machine();
    assert!(m.flush().is_none());
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), Instant::now());
    assert!(m.flush().is_some());
    assert!(m.flush().is_none());
}

#[test]
fn test_flush_session_ignores_stale_id() {
    let mut m = machine();
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), Instant::now());
    assert!(m.flush_session(uuid::Uuid::new_v4()).is_none());
    assert!(m.session().is_some());
}

#[test]
fn test_session_document_reconstructed() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), now);
    m.observe_batch(
        vec![
            PatchOp::new("", PatchKind::Append, json!({"type": "product_entity", "title": "Ket"})),
            PatchOp::new("/title", PatchKind::Append, json!("tle")),
        ],
        now,
    );
    let doc = m.session().unwrap().document();
    assert_eq!(doc.pointer("/title"), Some(&json!("Kettle")));
}

#[test]
fn test_huge_index_frame_is_absorbed() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), now);
    let ops = parse_frame(
        r#"data: {"v":[{"p":"/type","o":"replace","v":"product_entity"},{"p":"/a/18446744073709551615","o":"add","v":1},{"p":"/b/10000000000","o":"add","v":2}]}"#,
    )
    .unwrap();
    assert_eq!(m.observe_batch(ops, now), 1);
    let doc = m.session().unwrap().document();
    assert_eq!(doc.pointer("/a"), Some(&json!([])));
    assert_eq!(doc.pointer("/b"), Some(&json!([])));
    assert!(m.is_capturing(now));
}

#[test]
fn test_record_wire_shape() {
    let mut m = machine();
    let now = Instant::now();
    m.arm(&card("Kettle Pro"), "/c/abc", Utc::now(), now);
    m.observe_batch(vec![marker()], now);
    let v = serde_json::to_value(m.flush().unwrap()).unwrap();
    assert_eq!(v["product_hint"], "Kettle Pro");
    assert_eq!(v["events"][0]["o"], "patch");
    assert_eq!(v["events"][0]["v"][0]["v"], "product_entity");
    assert!(v["clicked_at"].is_string());
}

// ========== Frames ==========

#[test]
fn test_frames_split_across_chunks() {
    let mut d = FrameDecoder::new();
    assert!(d.push(b"data: {\"v\":[]}").is_empty());
    let frames = d.push(b"\n\ndata: [DONE]\n\n");
    assert_eq!(frames, vec!["data: {\"v\":[]}".to_string(), "data: [DONE]".to_string()]);
    assert_eq!(d.remainder(), "");
}

#[test]
fn test_frames_boundary_split_between_newlines() {
    let mut d = FrameDecoder::new();
    assert!(d.push("data: ₹1\n".as_bytes()).is_empty());
    let frames = d.push(b"\ndata: y\n\n");
    assert_eq!(frames, vec!["data: ₹1".to_string(), "data: y".to_string()]);
}

#[test]
fn test_frames_byte_at_a_time() {
    let text = "event: delta\ndata: {\"v\":[{\"p\":\"/t\",\"o\":\"add\",\"v\":\"Kettle ₹\"}]}\n\ndata: [DONE]\n\n";
    let mut d = FrameDecoder::new();
    let mut frames = Vec::new();
    for b in text.as_bytes() {
        frames.extend(d.push(std::slice::from_ref(b)));
    }
    assert_eq!(frames.len(), 2);
    assert_eq!(parse_frame(&frames[0]).unwrap()[0].value, json!("Kettle ₹"));
    assert_eq!(frames[1], "data: [DONE]");
    assert_eq!(d.remainder(), "");
}

#[test]
fn test_frames_multibyte_split() {
    let text = "data: {\"v\":[{\"p\":\"/price\",\"o\":\"add\",\"v\":\"₹99\"}]}\n\n";
    let bytes = text.as_bytes();
    let cut = text.find('₹').unwrap() + 1;
    let mut d = FrameDecoder::new();
    assert!(d.push(&bytes[..cut]).is_empty());
    let frames = d.push(&bytes[cut..]);
    assert_eq!(frames.len(), 1);
    let ops = parse_frame(&frames[0]).unwrap();
    assert_eq!(ops[0].value, json!("₹99"));
}

#[test]
fn test_frames_invalid_bytes_replaced() {
    let mut d = FrameDecoder::new();
    let frames = d.push(b"a\xffb\n\n");
    assert_eq!(frames, vec!["a\u{FFFD}b".to_string()]);
}

#[test]
fn test_parse_frame_terminator_and_noise() {
    assert!(parse_frame("data: [DONE]").is_none());
    assert!(parse_frame("event: ping").is_none());
    assert!(parse_frame("data:   ").is_none());
    assert!(parse_frame("data: {not json").is_none());
}

#[test]
fn test_parse_frame_non_array_v() {
    assert_eq!(parse_frame(r#"data: {"v": "text"}"#), Some(vec![]));
}

#[test]
fn test_parse_frame_drops_malformed_ops() {
    let ops = parse_frame(r#"data: {"v":[null,{"p":"/x"},{"p":"/type","o":"replace","v":"product_entity"}]}"#).unwrap();
    assert_eq!(ops.len(), 1);
    assert!(ops[0].is_entity_marker());
}

#[test]
fn test_product_info_url() {
    assert!(is_product_info_url("https://chatgpt.com/backend-api/lat/product_info"));
    assert!(is_product_info_url(PRODUCT_URL));
    assert!(!is_product_info_url("https://chatgpt.com/backend-api/conversation"));
}

// ========== Controller + Tap ==========

fn body(chunks: Vec<String>) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
    futures::stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
}

#[tokio::test(start_paused = true)]
async fn test_tap_records_entity_batches() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;

    let tap = ProductInfoTap::new(ctl.clone());
    let outcome = tap
        .tap(
            PRODUCT_URL,
            body(vec![
                frame(json!([{"p": "/title", "o": "add", "v": "x"}])),
                frame(json!([{"p": "/type", "o": "replace", "v": "product_entity"}, {"p": "", "o": "append", "v": {"id": 1}}])),
                "data: [DONE]\n\n".into(),
            ]),
        )
        .await;

    assert_eq!(outcome, TapOutcome::Read { frames: 3, batches: 2, kept: 2, end: ReadEnd::Complete });
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(sink.events(0), 1);
    assert_eq!(records[0]["conversation_id"], "conv-1");
    assert!(ctl.current_session().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_tap_skips_unmatched_and_idle() {
    let (ctl, sink) = controller();
    let tap = ProductInfoTap::new(ctl.clone());
    assert_eq!(tap.tap("https://x/other", body(vec![])).await, TapOutcome::NotMatched);
    assert_eq!(tap.tap(PRODUCT_URL, body(vec![])).await, TapOutcome::NotCapturing);
    assert!(sink.records().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stream_error_still_flushes_once() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;
    let tap = ProductInfoTap::new(ctl.clone());

    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(frame(json!([{"p": "/type", "o": "replace", "v": "product_entity"}])))),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
    ];
    let outcome = tap.tap(PRODUCT_URL, futures::stream::iter(chunks)).await;
    assert!(matches!(outcome, TapOutcome::Read { end: ReadEnd::StreamError(_), kept: 1, .. }));

    tokio::time::sleep(Duration::from_secs(40)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timer_flushes_idle_window_with_empty_events() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;
    tokio::time::sleep(Duration::from_millis(30_400)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.records().len(), 1);
    assert_eq!(sink.events(0), 0);
    assert!(!ctl.flush_now().await);
}

#[tokio::test(start_paused = true)]
async fn test_slow_stream_stops_when_session_ends() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;
    let tap = ProductInfoTap::new(ctl.clone());

    let slow = body(vec![
        frame(json!([{"p": "/type", "o": "replace", "v": "product_entity"}])),
        frame(json!([{"p": "/data", "o": "remove"}])),
        frame(json!([{"p": "/data", "o": "remove"}])),
    ])
    .then(|chunk| async move {
        tokio::time::sleep(Duration::from_secs(20)).await;
        chunk
    });

    let outcome = tap.tap(PRODUCT_URL, slow).await;
    assert!(matches!(outcome, TapOutcome::Read { end: ReadEnd::SessionEnded, kept: 1, .. }));
    tokio::task::yield_now().await;
    assert_eq!(sink.records().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_late_timer_does_not_flush_newer_session() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("First product"), "/c/a").await;
    assert!(ctl.flush_now().await);

    tokio::time::sleep(Duration::from_secs(10)).await;
    ctl.on_click(&card("Second product"), "/c/a").await;

    // First timer fires at 30.3s; the second session is still open then.
    tokio::time::sleep(Duration::from_secs(25)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.records().len(), 1);
    assert_eq!(ctl.current_session().unwrap().hint, "Second product");
}

// ========== Event Log Outbox ==========

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_event_log_is_retried() {
    let (ctl, sink) = controller();
    sink.reject.store(true, Ordering::SeqCst);
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;
    assert!(ctl.flush_now().await);
    assert!(sink.records().is_empty());
    assert_eq!(ctl.pending_event_logs(), 1);

    tokio::time::sleep(Duration::from_millis(2_100)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(ctl.pending_event_logs(), 1);

    sink.reject.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.records().len(), 1);
    assert_eq!(ctl.pending_event_logs(), 0);

    // Outbox is empty, so the retry loop has stopped.
    tokio::time::sleep(Duration::from_secs(10)).await;
    tokio::task::yield_now().await;
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_pending_event_logs_resent_in_order() {
    let (ctl, sink) = controller();
    sink.reject.store(true, Ordering::SeqCst);
    ctl.on_click(&card("First product"), "/c/a").await;
    ctl.flush_now().await;
    ctl.on_click(&card("Second product"), "/c/a").await;
    ctl.flush_now().await;
    assert_eq!(ctl.pending_event_logs(), 2);

    sink.reject.store(false, Ordering::SeqCst);
    assert_eq!(ctl.retry_pending().await, 2);
    let records = sink.records();
    assert_eq!(records[0]["product_hint"], "First product");
    assert_eq!(records[1]["product_hint"], "Second product");
    assert_eq!(ctl.pending_event_logs(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_event_log_not_kept() {
    let (ctl, sink) = controller();
    ctl.on_click(&card("Kettle Pro"), "/c/conv-1").await;
    ctl.flush_now().await;
    assert_eq!(ctl.pending_event_logs(), 0);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
}
