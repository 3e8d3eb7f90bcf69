mod common;

use common::*;
use doc_decoder::LopdfDecoder;
use std::sync::Arc;
use std::time::{Duration, Instant};
use viewer_core::{
    Action, CallerIdentity, Disposition, DocumentRef, DocumentState, DocumentViewer, Grant,
    HostContext, InputEvent, InputHub, InputTarget, KeyChord, KeyGateError, PageState, PageView,
    Rotation, ViewerConfig, ViewerError, ViewportInput,
};

fn handbook() -> DocumentRef {
    DocumentRef::new("doc-1", "handbook.pdf")
}

async fn open(decoder: FakeDecoder, grant: Grant) -> (DocumentViewer, Arc<RecordingSink>) {
    let (mut viewer, sink) = viewer_with(decoder, ViewerConfig::default());
    let gate = StaticGate::new("RIGHT", grant);
    viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect("unlock should succeed");
    (viewer, sink)
}

fn state_of(viewer: &DocumentViewer, page: u32) -> Option<PageState> {
    viewer.page(page).state()
}

#[tokio::test]
async fn scrolling_moves_the_window_without_dropping_the_displayed_page() {
    let (mut viewer, _sink) = open(FakeDecoder::new(10), Grant::view_only()).await;
    viewer.settle().await;
    assert_eq!(viewer.resident_pages(), vec![1, 2, 3]);
    assert_eq!(viewer.displayed_page(), Some(1));

    let update = viewer.set_current_page(5).expect("viewer is loaded");
    assert_eq!(update.scheduled, vec![4, 5, 6, 7]);
    assert_eq!(update.evicted, vec![2]);

    while let Some(report) = viewer.next_commit().await {
        let resident = viewer.resident_pages();
        assert!(resident.contains(&5), "current page evicted after {report:?}");
        let displayed = viewer.displayed_page().expect("something is displayed");
        assert!(resident.contains(&displayed), "displayed page {displayed} evicted");
    }

    assert_eq!(viewer.resident_pages(), vec![3, 4, 5, 6, 7]);
    assert_eq!(viewer.displayed_page(), Some(5));
    assert!(viewer.is_settled());
}

#[tokio::test]
async fn window_is_bounded_at_document_edges() {
    let (mut viewer, _sink) = open(FakeDecoder::new(10), Grant::full()).await;

    viewer.set_current_page(10).expect("viewer is loaded");
    viewer.settle().await;
    assert_eq!(viewer.resident_pages(), vec![8, 9, 10]);

    viewer.set_current_page(0).expect("viewer is loaded");
    viewer.settle().await;
    assert_eq!(viewer.resident_pages(), vec![1, 2, 3]);
    assert_eq!(viewer.current_page(), Some(1));
}

#[tokio::test]
async fn repeating_the_current_page_does_nothing() {
    let (mut viewer, _sink) = open(FakeDecoder::new(10), Grant::full()).await;
    viewer.set_current_page(5).expect("viewer is loaded");
    viewer.settle().await;
    let before = viewer.stats();

    let update = viewer.set_current_page(5).expect("viewer is loaded");

    assert!(update.is_noop());
    assert_eq!(viewer.in_flight(), 0);
    assert_eq!(viewer.settle().await, 0);
    assert_eq!(viewer.stats(), before);
}

#[tokio::test]
async fn zoom_discards_renders_from_the_previous_scale() {
    let (mut viewer, _sink) = open(FakeDecoder::new(10), Grant::full()).await;
    assert_eq!(viewer.in_flight(), 3);

    let update = viewer.zoom_in().expect("viewer is loaded").expect("scale changes");
    assert_eq!(update.evicted, vec![1, 2, 3]);
    assert_eq!(update.scheduled, vec![1, 2, 3]);
    assert_eq!(viewer.epoch(), Some(1));

    viewer.settle().await;

    assert_eq!(viewer.stats().discarded_stale, 3);
    for page in 1..=3 {
        match viewer.page(page) {
            PageView::Ready(surface) => {
                assert_eq!(surface.epoch, 1);
                assert_eq!(surface.height(), (FAKE_HEIGHT_PT * 1.45).round() as u32);
            }
            other => panic!("page {page} is {other:?}"),
        }
    }
}

#[tokio::test]
async fn rotation_clears_every_committed_page_first() {
    let (mut viewer, _sink) = open(FakeDecoder::new(10), Grant::full()).await;
    viewer.settle().await;

    viewer.rotate_clockwise().expect("viewer is loaded").expect("rotation changes");

    assert_eq!(viewer.document().map(|doc| doc.rotation()), Some(Rotation::Deg90));
    for page in viewer.resident_pages() {
        assert_ne!(state_of(&viewer, page), Some(PageState::Ready), "stale page {page} kept");
    }
    assert_eq!(viewer.displayed_page(), None);

    viewer.settle().await;
    match viewer.page(1) {
        PageView::Ready(surface) => assert_eq!((surface.width(), surface.height()), (168, 120)),
        other => panic!("page 1 is {other:?}"),
    }
    assert_eq!(viewer.displayed_page(), Some(1));
}

#[tokio::test]
async fn scale_is_clamped_and_unchanged_scale_is_a_no_op() {
    let (mut viewer, _sink) = open(FakeDecoder::new(4), Grant::full()).await;

    assert!(viewer.set_scale(1.2).expect("viewer is loaded").is_none());
    assert!(viewer.set_scale(10.0).expect("viewer is loaded").is_some());
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(3.0));
    assert!(viewer.zoom_in().expect("viewer is loaded").is_none());

    viewer.zoom_out().expect("viewer is loaded");
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(2.75));
    assert_eq!(viewer.epoch(), Some(2));
}

#[tokio::test]
async fn non_finite_scale_is_ignored() {
    let (mut viewer, _sink) = open(FakeDecoder::new(4), Grant::full()).await;

    for scale in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
        assert!(viewer.set_scale(scale).expect("viewer is loaded").is_none());
    }
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(1.2));
    assert_eq!(viewer.epoch(), Some(0));

    let t0 = Instant::now();
    viewer.observe(ViewportInput::Zoom { scale: f32::NAN }, t0).expect("viewer is loaded");
    viewer.flush_viewport(t0 + Duration::from_secs(1)).expect("viewer is loaded");
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(1.2));

    viewer.zoom_in().expect("viewer is loaded");
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(1.45));
}

#[tokio::test]
async fn watermark_present_exactly_when_download_is_denied() {
    for grant in [Grant::view_only(), Grant::full()] {
        let (mut viewer, _sink) = open(FakeDecoder::new(6), grant).await;
        viewer.set_current_page(3).expect("viewer is loaded");
        viewer.settle().await;

        let pages = viewer.resident_pages();
        assert_eq!(pages, vec![1, 2, 3, 4, 5]);
        for page in pages {
            match viewer.page(page) {
                PageView::Ready(surface) => {
                    assert_eq!(surface.is_watermarked(), !grant.can_download, "page {page}");
                    if let Some(spec) = &surface.watermark {
                        assert_eq!(spec.text, format!("Ada Lovelace - VIEW ONLY - PAGE {page}"));
                    }
                }
                other => panic!("page {page} is {other:?}"),
            }
        }

        let listeners = if grant.can_download { 0 } else { 2 };
        assert_eq!(viewer.input().listener_count(), listeners);
        assert_eq!(viewer.permits(Action::Download), grant.can_download);
        assert!(viewer.permits(Action::View));
    }
}

#[tokio::test]
async fn wrong_key_can_be_retried_with_the_right_one() {
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(3), ViewerConfig::default());
    let gate = StaticGate::new("RIGHT", Grant::view_only());

    let err = viewer.unlock(&gate, handbook(), key("WRONG")).await.expect_err("wrong key");
    assert!(matches!(err, ViewerError::KeyGate(KeyGateError::InvalidKey(_))));
    assert!(err.is_retryable());
    assert_eq!(viewer.state(), DocumentState::Unloaded);
    assert!(viewer.document().is_none());
    assert!(viewer.resident_pages().is_empty());

    viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect("right key");
    assert_eq!(viewer.state(), DocumentState::Loaded);
    let document = viewer.document().expect("document is open");
    assert!(document.grant().can_view);
    assert_eq!(document.page_count(), 3);
    assert_eq!(*gate.calls.lock(), 2);
}

#[tokio::test]
async fn network_failure_leaves_viewer_reusable() {
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(3), ViewerConfig::default());
    let gate = FailingGate(KeyGateError::Network("connection reset".to_string()));

    let err = viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect_err("network down");

    assert!(err.is_retryable());
    assert_eq!(viewer.state(), DocumentState::Unloaded);
}

#[tokio::test]
async fn abandoned_unlock_can_be_retried() {
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(3), ViewerConfig::default());

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        viewer.unlock(&StalledGate, handbook(), key("RIGHT")),
    )
    .await;
    assert!(abandoned.is_err(), "stalled exchange should time out");
    assert_eq!(viewer.state(), DocumentState::Unloaded);
    assert!(viewer.document().is_none());

    let gate = StaticGate::new("RIGHT", Grant::view_only());
    viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect("retry should succeed");
    assert_eq!(viewer.state(), DocumentState::Loaded);
    assert_eq!(viewer.document().map(|doc| doc.page_count()), Some(3));
}

#[tokio::test]
async fn forbidden_closes_the_viewer() {
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(3), ViewerConfig::default());
    let gate = FailingGate(KeyGateError::Forbidden("not shared with you".to_string()));

    let err = viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect_err("forbidden");
    assert!(!err.is_retryable());
    assert_eq!(viewer.state(), DocumentState::Closed);

    let retry = StaticGate::new("RIGHT", Grant::full());
    let err = viewer.unlock(&retry, handbook(), key("RIGHT")).await.expect_err("viewer closed");
    assert!(matches!(err, ViewerError::InvalidState { actual: DocumentState::Closed, .. }));
    assert_eq!(*retry.calls.lock(), 0);
}

#[tokio::test]
async fn grant_without_view_is_forbidden() {
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(3), ViewerConfig::default());
    let gate = StaticGate::new("RIGHT", Grant { can_view: false, can_download: true });

    let err = viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect_err("no view access");

    assert!(matches!(err, ViewerError::KeyGate(KeyGateError::Forbidden(_))));
    assert_eq!(viewer.state(), DocumentState::Closed);
}

#[tokio::test]
async fn undecodable_content_closes_the_viewer_without_listeners() {
    let hub = InputHub::new();
    let host = HostContext::new(CallerIdentity::new("user-17", "Ada")).with_input(hub.clone());
    let mut viewer =
        DocumentViewer::new(ViewerConfig::default(), Arc::new(LopdfDecoder::new()), host)
            .expect("config should be valid");
    let gate = StaticGate::new("RIGHT", Grant::view_only());

    let err = viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect_err("bytes are garbage");

    assert!(matches!(err, ViewerError::Decode(_)));
    assert_eq!(viewer.state(), DocumentState::Closed);
    assert_eq!(hub.listener_count(), 0);
}

#[tokio::test]
async fn failed_page_is_isolated_and_retried_on_reentry() {
    let (mut viewer, _sink) = open(FakeDecoder::new(8).failing(2), Grant::full()).await;
    viewer.settle().await;

    assert!(matches!(viewer.page(2), PageView::Failed(_)));
    assert_eq!(state_of(&viewer, 1), Some(PageState::Ready));
    assert_eq!(state_of(&viewer, 3), Some(PageState::Ready));
    assert_eq!(viewer.state(), DocumentState::Loaded);
    assert_eq!(viewer.stats().failures, 1);

    viewer.set_current_page(8).expect("viewer is loaded");
    viewer.settle().await;
    assert_eq!(viewer.page(2).state(), None);

    viewer.set_current_page(1).expect("viewer is loaded");
    viewer.settle().await;
    assert!(matches!(viewer.page(2), PageView::Failed(_)));
    assert_eq!(viewer.stats().failures, 2);
}

#[tokio::test]
async fn save_shortcut_is_intercepted_with_a_harmless_decoy() {
    let (mut viewer, sink) = open(FakeDecoder::new(3), Grant::view_only()).await;

    let save = InputEvent::KeyDown(KeyChord::ctrl('s'));
    assert_eq!(viewer.input().dispatch(&save), Disposition::Prevented);
    let menu = InputEvent::ContextMenu { target: InputTarget::DocumentSurface };
    assert_eq!(viewer.input().dispatch(&menu), Disposition::Prevented);

    assert_eq!(sink.notices.lock().len(), 2);
    {
        let decoys = sink.decoys.lock();
        assert_eq!(decoys.len(), 2);
        for decoy in decoys.iter() {
            assert_eq!(decoy.file_name, "ACCESS_DENIED_handbook.pdf");
            assert!(!decoy.bytes.windows(CONTENT_MARKER.len()).any(|w| w == CONTENT_MARKER));
        }
    }

    viewer.close();
    assert_eq!(viewer.state(), DocumentState::Closed);
    assert_eq!(viewer.input().listener_count(), 0);
    assert_eq!(viewer.input().dispatch(&save), Disposition::Proceed);
    assert_eq!(sink.notices.lock().len(), 2);
}

#[tokio::test]
async fn dropping_the_viewer_removes_listeners() {
    let hub = InputHub::new();
    let host = HostContext::new(CallerIdentity::new("user-17", "Ada")).with_input(hub.clone());
    let mut viewer = DocumentViewer::new(ViewerConfig::default(), Arc::new(FakeDecoder::new(2)), host)
        .expect("config should be valid");
    let gate = StaticGate::new("RIGHT", Grant::view_only());
    viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect("unlock should succeed");
    assert_eq!(hub.listener_count(), 2);

    drop(viewer);

    assert_eq!(hub.listener_count(), 0);
}

#[tokio::test]
async fn closed_viewer_holds_nothing() {
    let (mut viewer, _sink) = open(FakeDecoder::new(5), Grant::full()).await;
    viewer.settle().await;

    viewer.close();

    assert!(viewer.resident_pages().is_empty());
    assert!(matches!(viewer.page(1), PageView::Absent));
    assert!(!viewer.permits(Action::View));
    let err = viewer.set_current_page(2).expect_err("viewer is closed");
    assert!(matches!(err, ViewerError::InvalidState { .. }));
}

#[tokio::test]
async fn viewport_input_drives_the_window_after_debounce() {
    let config = ViewerConfig::default().with_debounce_ms(150);
    let (mut viewer, _sink) = viewer_with(FakeDecoder::new(12), config);
    let gate = StaticGate::new("RIGHT", Grant::full());
    viewer.unlock(&gate, handbook(), key("RIGHT")).await.expect("unlock should succeed");
    viewer.settle().await;

    // 100x140pt pages at 1.2 are 168px tall with a 20px gap.
    let offset = viewer.scroll_offset_for_page(6).expect("document is open");
    assert!((offset - 5.0 * 188.0).abs() < 0.01, "offset {offset}");

    let t0 = Instant::now();
    viewer.observe(ViewportInput::Resize { width_px: 400.0, height_px: 100.0 }, t0).expect("loaded");
    viewer.observe(ViewportInput::Scroll { offset_px: offset }, t0).expect("loaded");

    assert!(viewer.flush_viewport(t0).expect("loaded").is_empty());
    let deadline = viewer.viewport_deadline().expect("input is pending");
    assert_eq!(deadline, t0 + Duration::from_millis(150));

    let updates = viewer.flush_viewport(deadline).expect("loaded");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].window.current_page, 6);
    viewer.settle().await;
    assert_eq!(viewer.resident_pages(), vec![4, 5, 6, 7, 8]);

    let t1 = deadline + Duration::from_secs(1);
    viewer.observe(ViewportInput::Zoom { scale: 2.0 }, t1).expect("loaded");
    let updates = viewer.flush_viewport(t1 + Duration::from_millis(150)).expect("loaded");

    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].scheduled, vec![4, 5, 6, 7, 8]);
    assert_eq!(viewer.document().map(|doc| doc.scale()), Some(2.0));
    assert_eq!(viewer.current_page(), Some(6));
    assert_eq!(viewer.viewport_deadline(), None);
}
