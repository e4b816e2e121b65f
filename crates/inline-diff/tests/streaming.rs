use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inline_diff::{
    ApplyOptions, ApplyTarget, DocumentKey, InlineDiffEvent, InlineDiffManager, LineRange,
    RegionViewKind, RopeDocument, StreamAbortHandle,
};
use pretty_assertions::assert_eq;

fn manager_with(text: &str) -> (InlineDiffManager, DocumentKey) {
    let mut manager = InlineDiffManager::new();
    let key = DocumentKey::new("file:///stream.rs");
    manager.attach_document(key.clone(), Box::new(RopeDocument::new(text)));
    (manager, key)
}

fn sweep_line_of(manager: &InlineDiffManager, key: &DocumentKey) -> Option<usize> {
    match manager.region_views(key).first()?.kind {
        RegionViewKind::StreamingEdit { sweep_line } => sweep_line,
        RegionViewKind::PendingInstruction { .. } => None,
    }
}

struct FlagAbort(Arc<AtomicBool>);

impl StreamAbortHandle for FlagAbort {
    fn abort(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_chunks_materialize_confirmed_prefix_only() {
    let (mut manager, key) = manager_with("alpha\nbeta\ngamma\ndelta\n");
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();

    // The trailing block may still grow, so the first chunk confirms nothing
    // beyond the untouched first line.
    manager.on_stream_chunk(region, "alpha\nBETA");
    assert_eq!(
        manager.document_text(&key).unwrap(),
        "alpha\nbeta\ngamma\ndelta\n"
    );
    assert_eq!(manager.region_views(&key)[0].diffs.len(), 0);

    // Once gamma matches again, the BETA rewrite is confirmed and lands.
    manager.on_stream_chunk(region, "alpha\nBETA\ngamma\nDEL");
    assert_eq!(
        manager.document_text(&key).unwrap(),
        "alpha\nBETA\ngamma\ndelta\n"
    );
    assert_eq!(manager.region_views(&key)[0].diffs.len(), 1);
    assert_eq!(sweep_line_of(&manager, &key), Some(4));

    manager.on_stream_end(region, "alpha\nBETA\ngamma\nDELTA");
    assert_eq!(
        manager.document_text(&key).unwrap(),
        "alpha\nBETA\ngamma\nDELTA\n"
    );
    let views = manager.region_views(&key);
    assert_eq!(views[0].diffs.len(), 2);
    assert_eq!(sweep_line_of(&manager, &key), None);
}

#[test]
fn test_sweep_line_is_monotonic_across_chunks() {
    let (mut manager, key) = manager_with("a\nb\nc\nd\ne\n");
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();

    let mut last = 0;
    for chunk in ["a\nB", "a\nB\nc", "a\nB\nc\nD", "a\nB\nc\nD\ne"] {
        manager.on_stream_chunk(region, chunk);
        let sweep = sweep_line_of(&manager, &key).unwrap();
        assert!(sweep >= last, "sweep line went backwards: {last} -> {sweep}");
        last = sweep;
    }
}

#[test]
fn test_user_edit_above_mid_stream_relocates_the_write() {
    let (mut manager, key) = manager_with("h1\nh2\nc1\nc2\nc3\nc4\n");
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::Lines(LineRange::new(3, 6)),
            abort: None,
        })
        .unwrap();

    manager.on_stream_chunk(region, "c1\nC2");

    // The user inserts two lines at the very top while the stream runs.
    manager.apply_user_edit(&key, LineRange::empty_at(1), Some("x\ny"));
    assert_eq!(manager.region_views(&key)[0].range, LineRange::new(5, 8));

    manager.on_stream_end(region, "c1\nC2\nc3\nc4");
    assert_eq!(
        manager.document_text(&key).unwrap(),
        "x\ny\nh1\nh2\nc1\nC2\nc3\nc4\n"
    );
    let views = manager.region_views(&key);
    assert_eq!(views[0].range, LineRange::new(5, 8));
    assert_eq!(views[0].diffs.len(), 1);
    assert_eq!(views[0].diffs[0].range, LineRange::new(6, 6));
}

#[test]
fn test_interrupt_rolls_back_to_prestream_content() {
    let original = "a\nb\nc\nd\n";
    let (mut manager, key) = manager_with(original);
    let aborted = Arc::new(AtomicBool::new(false));
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: Some(Box::new(FlagAbort(aborted.clone()))),
        })
        .unwrap();

    // This chunk confirms a real change ("A") into the document.
    manager.on_stream_chunk(region, "A\nb\nC");
    assert_eq!(manager.document_text(&key).unwrap(), "A\nb\nc\nd\n");

    manager.interrupt_streaming(region);

    assert!(aborted.load(Ordering::SeqCst));
    assert_eq!(manager.document_text(&key).unwrap(), original);
    assert!(manager.region_views(&key).is_empty());
    // Cancellation leaves no undo entry behind.
    assert!(!manager.can_undo(&key));
}

#[test]
fn test_stream_error_keeps_partial_content_until_resolved() {
    let original = "a\nb\nc\nd\n";
    let (mut manager, key) = manager_with(original);
    let mut failures = Vec::new();

    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();
    manager.subscribe({
        let sink = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink2 = sink.clone();
        failures.push(sink);
        move |event| {
            if let InlineDiffEvent::StreamFailed { message, .. } = event {
                sink2.lock().unwrap().push(message.clone());
            }
        }
    });

    manager.on_stream_chunk(region, "A\nb\nC");
    manager.on_stream_error(region, "connection reset");

    // Partial content stays, the region goes idle, the error is surfaced.
    assert_eq!(manager.document_text(&key).unwrap(), "A\nb\nc\nd\n");
    assert_eq!(sweep_line_of(&manager, &key), None);
    assert_eq!(
        failures[0].lock().unwrap().as_slice(),
        ["connection reset".to_string()]
    );

    // Keeping the partial edit closes the transaction into one undo step.
    assert!(manager.keep_partial_edit(&key));
    assert!(manager.can_undo(&key));

    assert!(manager.undo(&key));
    assert_eq!(manager.document_text(&key).unwrap(), original);
    assert!(manager.region_views(&key).is_empty());

    assert!(manager.redo(&key));
    assert_eq!(manager.document_text(&key).unwrap(), "A\nb\nc\nd\n");
    let views = manager.region_views(&key);
    assert_eq!(views.len(), 1);
    assert!(!views[0].diffs.is_empty());
}

#[test]
fn test_stream_error_then_discard_restores_original() {
    let original = "a\nb\nc\nd\n";
    let (mut manager, key) = manager_with(original);
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();

    manager.on_stream_chunk(region, "A\nb\nC");
    manager.on_stream_error(region, "aborted");

    assert!(manager.discard_partial_edit(&key));
    assert_eq!(manager.document_text(&key).unwrap(), original);
    assert!(manager.region_views(&key).is_empty());
    assert!(!manager.can_undo(&key));
}

#[test]
fn test_stream_reproducing_baseline_dissolves_region() {
    let (mut manager, key) = manager_with("a\nb\nc\n");
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();

    manager.on_stream_end(region, "a\nb\nc");

    assert_eq!(manager.document_text(&key).unwrap(), "a\nb\nc\n");
    assert!(manager.region_views(&key).is_empty());
}

#[test]
fn test_chunks_after_end_are_ignored() {
    let (mut manager, key) = manager_with("a\nb\n");
    let region = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::WholeDocument,
            abort: None,
        })
        .unwrap();

    manager.on_stream_end(region, "a\nB");
    let settled = manager.document_text(&key).unwrap();

    manager.on_stream_chunk(region, "a\nB\nzzz");
    assert_eq!(manager.document_text(&key).unwrap(), settled);
}

#[test]
fn test_second_stream_on_same_document_waits_for_first() {
    let (mut manager, key) = manager_with("a\nb\nc\nd\ne\nf\n");
    manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::Lines(LineRange::new(1, 2)),
            abort: None,
        })
        .unwrap();

    let err = manager
        .start_applying(ApplyOptions {
            document: key.clone(),
            target: ApplyTarget::Lines(LineRange::new(5, 6)),
            abort: None,
        })
        .unwrap_err();
    assert!(matches!(err, inline_diff::InlineDiffError::EditInFlight(_)));
}
