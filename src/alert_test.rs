use super::*;
use crate::test_support::{FakeSound, SoundCall};

const POPUP: Duration = Duration::from_millis(5000);

fn notifier(registry: SlotRegistry, sound: Arc<FakeSound>) -> (AlertNotifier, Page) {
    let page = Page::new(registry.len());
    let notifier = AlertNotifier::new(Arc::new(registry), page.clone(), sound as Arc<dyn AlertSound>, POPUP);
    (notifier, page)
}

fn remote_registry() -> SlotRegistry {
    SlotRegistry::from_entries(vec![
        ("Lobby".to_string(), SourceRef::parse("0")),
        ("Dock".to_string(), SourceRef::parse("rtsp://10.0.0.7/stream")),
    ])
    .unwrap()
}

// =============================================================================
// popup content
// =============================================================================

#[tokio::test(start_paused = true)]
async fn notify_shows_named_popup_without_link_for_device() {
    let (notifier, page) = notifier(remote_registry(), FakeSound::new());
    notifier.notify(1);

    let popup = page.snapshot().popup;
    assert!(popup.visible);
    assert_eq!(popup.content, Some(PopupContent { camera_name: "Lobby".into(), stream_link: None }));
}

#[tokio::test(start_paused = true)]
async fn notify_adds_stream_link_for_remote_source() {
    let (notifier, page) = notifier(remote_registry(), FakeSound::new());
    notifier.notify(2);

    let content = page.snapshot().popup.content.unwrap();
    assert_eq!(content.stream_link.as_deref(), Some("rtsp://10.0.0.7/stream"));
    assert!(content.to_html().contains("View Stream"));
}

#[tokio::test(start_paused = true)]
async fn notify_falls_back_to_generic_name() {
    let (notifier, page) = notifier(SlotRegistry::default_grid(), FakeSound::new());
    notifier.notify(23);

    let content = page.snapshot().popup.content.unwrap();
    assert_eq!(content.camera_name, "Camera 23");
    assert_eq!(notifier.current().map(|e| e.slot_index), Some(23));
}

#[tokio::test(start_paused = true)]
async fn notify_highlights_cell() {
    let (notifier, page) = notifier(SlotRegistry::default_grid(), FakeSound::new());
    notifier.notify(3);
    assert_eq!(page.snapshot().highlighted(), vec![3]);
}

// =============================================================================
// expiry
// =============================================================================

#[tokio::test(start_paused = true)]
async fn popup_hides_after_display_window() {
    let (notifier, page) = notifier(SlotRegistry::default_grid(), FakeSound::new());
    notifier.notify(3);

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert!(page.snapshot().popup.visible);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let model = page.snapshot();
    assert!(!model.popup.visible);
    assert!(model.highlighted().is_empty());
    assert!(notifier.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn repeat_notify_restarts_expiry_window() {
    let (notifier, page) = notifier(SlotRegistry::default_grid(), FakeSound::new());
    notifier.notify(3);
    tokio::time::sleep(Duration::from_millis(1000)).await;
    notifier.notify(3);
    let second = Instant::now();

    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert!(page.snapshot().popup.visible, "still visible 4000ms after the second call");
    assert_eq!(notifier.current().map(|e| e.displayed_until), Some(second + POPUP));

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!page.snapshot().popup.visible, "hidden by 5100ms after the second call");
}

#[tokio::test(start_paused = true)]
async fn newer_alert_replaces_popup() {
    let (notifier, page) = notifier(remote_registry(), FakeSound::new());
    notifier.notify(1);
    notifier.notify(2);

    let model = page.snapshot();
    assert_eq!(model.popup.content.unwrap().camera_name, "Dock");
    assert_eq!(notifier.current().map(|e| e.slot_index), Some(2));
}

#[tokio::test(start_paused = true)]
async fn dismiss_hides_immediately_and_cancels_expiry() {
    let (notifier, page) = notifier(SlotRegistry::default_grid(), FakeSound::new());
    notifier.notify(4);
    notifier.dismiss();

    let model = page.snapshot();
    assert!(!model.popup.visible);
    assert!(model.highlighted().is_empty());

    // A later alert must get its full window despite the cancelled expiry.
    tokio::time::sleep(Duration::from_millis(3000)).await;
    notifier.notify(5);
    tokio::time::sleep(Duration::from_millis(4000)).await;
    assert!(page.snapshot().popup.visible);
}

// =============================================================================
// audio
// =============================================================================

#[tokio::test(start_paused = true)]
async fn notify_plays_sound_from_start() {
    let sound = FakeSound::new();
    let (notifier, _page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));
    notifier.notify(1);

    assert_eq!(
        sound.calls(),
        vec![SoundCall::Source(ALERT_SOUND_PATH.into()), SoundCall::Rewind, SoundCall::Play { volume: 1.0 }]
    );
}

#[test]
fn unlock_plays_muted_then_restores_volume() {
    let sound = FakeSound::new();
    let (notifier, _page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));

    assert!(notifier.unlock_audio());
    assert!(notifier.audio_unlocked());
    assert_eq!(
        sound.calls(),
        vec![
            SoundCall::Volume(0.0),
            SoundCall::Play { volume: 0.0 },
            SoundCall::Pause,
            SoundCall::Rewind,
            SoundCall::Volume(1.0),
        ]
    );

    // Already unlocked: no further media calls.
    assert!(notifier.unlock_audio());
    assert_eq!(sound.calls().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn blocked_audio_never_blocks_popup() {
    let sound = FakeSound::blocked();
    let (notifier, page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));

    assert!(!notifier.unlock_audio());
    assert!(!notifier.audio_unlocked());
    notifier.notify(2);

    assert!(page.snapshot().popup.visible);
    // The alert still attempts playback at full volume.
    assert_eq!(sound.plays(), vec![0.0, 1.0]);
}

#[test]
fn failed_unlock_can_be_retried() {
    let sound = FakeSound::blocked();
    let (notifier, _page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));
    assert!(!notifier.unlock_audio());

    sound.blocked.store(false, std::sync::atomic::Ordering::SeqCst);
    assert!(notifier.unlock_audio());
}

// =============================================================================
// cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn guarded_notify_after_cancel_shows_nothing() {
    let sound = FakeSound::new();
    let (notifier, page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));
    let cancel = CancellationToken::new();
    cancel.cancel();
    notifier.dismiss();

    assert!(!notifier.notify_guarded(&cancel, 3));
    let model = page.snapshot();
    assert!(!model.popup.visible);
    assert!(model.highlighted().is_empty());
    assert!(notifier.current().is_none());
    assert!(sound.plays().is_empty());
}

#[tokio::test(start_paused = true)]
async fn guarded_notify_while_live_behaves_like_notify() {
    let sound = FakeSound::new();
    let (notifier, page) = notifier(SlotRegistry::default_grid(), Arc::clone(&sound));
    let cancel = CancellationToken::new();

    assert!(notifier.notify_guarded(&cancel, 3));
    assert!(page.snapshot().popup.visible);
    assert_eq!(sound.plays(), vec![1.0]);

    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert!(!page.snapshot().popup.visible);
}
