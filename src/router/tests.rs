//! Tests for the session router

use super::*;
use crate::device::{DeviceKind, Direction};
use crate::error::TransportError;
use crate::lumi::{Command, Mode, RootKey, Scale};
use crate::transport::{HotplugEvent, NoteHandler, Port};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

struct FakeOutput {
    endpoint: Endpoint,
    sent: Mutex<Vec<Vec<u8>>>,
    failing: AtomicBool,
}

impl FakeOutput {
    fn new(name: &str) -> Arc<Self> {
        Self::with_endpoint(Endpoint::new(name, name, "", Direction::Output))
    }

    fn with_endpoint(endpoint: Endpoint) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        })
    }

    fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    fn clear(&self) {
        self.sent.lock().clear();
    }

    fn port(self: &Arc<Self>) -> Port {
        Port::Output(self.clone())
    }
}

impl OutputEndpoint for FakeOutput {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Disconnected(self.endpoint.id.clone()));
        }
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }
}

struct FakeInput {
    endpoint: Endpoint,
    handlers: Arc<Mutex<Vec<(u64, NoteHandler)>>>,
    next_id: AtomicU64,
    subscribe_calls: AtomicUsize,
}

impl FakeInput {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            endpoint: Endpoint::new(name, name, "", Direction::Input),
            handlers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
            subscribe_calls: AtomicUsize::new(0),
        })
    }

    fn play(&self, note: u8) {
        let handlers: Vec<NoteHandler> = self.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
        for handler in handlers {
            handler(NoteEvent {
                endpoint_id: self.endpoint.id.clone(),
                note,
                velocity: 100,
                on: true,
                timestamp: std::time::Instant::now(),
            });
        }
    }

    fn listeners(&self) -> usize {
        self.handlers.lock().len()
    }

    fn port(self: &Arc<Self>) -> Port {
        Port::Input(self.clone())
    }
}

impl InputEndpoint for FakeInput {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn on_note(&self, handler: NoteHandler) -> Result<NoteSubscription, TransportError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().push((id, handler));
        let handlers = self.handlers.clone();
        Ok(NoteSubscription::new(move || {
            handlers.lock().retain(|(h, _)| *h != id);
        }))
    }
}

fn make_router(outputs: &[&Arc<FakeOutput>]) -> SessionRouter {
    let router = SessionRouter::new(RouterSettings::default());
    for output in outputs {
        router.attach(output.port());
    }
    router
}

fn frame(cmd: Command) -> Vec<u8> {
    cmd.to_frame(DeviceId::DEFAULT).as_bytes().to_vec()
}

fn note_on(note: u8) -> Vec<u8> {
    vec![0x90, note, 102]
}

#[test]
fn test_challenge_skips_lighting_outputs() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    let delivery = router.route_note(NoteKind::Challenge, 60, 0.8, NoteLength::Sustain);

    assert!(lumi.sent().is_empty());
    assert_eq!(piano.sent(), vec![note_on(60)]);
    assert_eq!(delivery.delivered, vec!["Digital Piano".to_string()]);
    assert_eq!(delivery.attempted(), vec!["Digital Piano"]);
}

#[test]
fn test_feedback_reaches_every_output() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    let delivery = router.route_note(NoteKind::Feedback, 64, 0.8, NoteLength::Sustain);

    assert_eq!(lumi.sent(), vec![note_on(64)]);
    assert_eq!(piano.sent(), vec![note_on(64)]);
    assert!(delivery.all_delivered());
    assert_eq!(delivery.delivered.len(), 2);
}

#[test]
fn test_challenge_with_only_lumi_sends_nothing() {
    let lumi = FakeOutput::new("ROLI LUMI Keys BLOCK");
    let router = make_router(&[&lumi]);

    let delivery = router.route_note(NoteKind::Challenge, 60, 1.0, NoteLength::Sustain);
    assert!(delivery.is_empty());
    assert!(lumi.sent().is_empty());
}

#[test]
fn test_lighting_only_reaches_lighting_outputs() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    router.set_primary_color(255, 0, 0);

    let expected = vec![
        0xF0, 0x00, 0x21, 0x10, 0x77, 0x00, 0x10, 0x20, 0x04, 0x00, 0x00, 0x7F, 0x7F, 0x03, 0x1B,
        0xF7,
    ];
    assert_eq!(lumi.sent(), vec![expected]);
    assert!(piano.sent().is_empty());
}

#[test]
fn test_raw_frame_is_not_recorded() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    let raw = crate::lumi::wrap_payload_hex("10 40 02 00 00 00 00 00", DeviceId::DEFAULT).unwrap();
    let delivery = router.send_frame(&raw);

    assert_eq!(delivery.delivered, vec!["LUMI Keys".to_string()]);
    assert_eq!(lumi.sent(), vec![raw.as_bytes().to_vec()]);
    assert!(piano.sent().is_empty());
    assert!(router.display_state().is_empty());
}

#[test]
fn test_configure_key_scale_order() {
    let lumi = FakeOutput::new("LUMI Keys");
    let router = make_router(&[&lumi]);

    router.configure_key_scale(RootKey::C, Scale::Major);

    let sent = lumi.sent();
    assert_eq!(
        sent,
        vec![
            frame(Command::RootKey(RootKey::C)),
            frame(Command::Scale(Scale::Major)),
            frame(Command::Mode(Mode::Single)),
        ]
    );
    assert_eq!(sent[0][14], 0x41);
    assert_eq!(sent[1][14], 0x7E);
    assert_eq!(sent[2][14], 0x3E);

    let display = router.display_state();
    assert_eq!(display.root_key, Some(RootKey::C));
    assert_eq!(display.scale, Some(Scale::Major));
    assert_eq!(display.mode, Some(Mode::Single));
}

#[test]
fn test_send_failure_is_isolated() {
    let broken = FakeOutput::new("LUMI Keys");
    let lumi = FakeOutput::new("LUMI Keys 2");
    broken.failing.store(true, Ordering::SeqCst);
    let router = make_router(&[&broken, &lumi]);

    let delivery = router.configure_key_scale(RootKey::G, Scale::Minor);

    assert_eq!(delivery.delivered, vec!["LUMI Keys 2".to_string()]);
    assert_eq!(delivery.failed.len(), 1);
    assert_eq!(delivery.failed[0].0, "LUMI Keys");
    assert_eq!(lumi.sent().len(), 3);
}

#[test]
fn test_unknown_ids_are_kept_as_preferences() {
    let router = SessionRouter::new(RouterSettings {
        auto_join: false,
        ..Default::default()
    });
    let session = router.set_active_outputs(["LUMI Keys", "LUMI Keys", "Digital Piano"]);
    assert!(session.active_outputs.is_empty());
    assert_eq!(session.preferred_outputs, vec!["LUMI Keys", "Digital Piano"]);

    let piano = FakeOutput::new("Digital Piano");
    router.attach(piano.port());
    assert_eq!(router.primary_lighting_output().unwrap().id, "Digital Piano");

    let lumi = FakeOutput::new("LUMI Keys");
    router.attach(lumi.port());
    assert_eq!(router.primary_lighting_output().unwrap().id, "LUMI Keys");

    let session = router.session();
    let ids: Vec<_> = session.active_outputs.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["LUMI Keys", "Digital Piano"]);
}

#[test]
fn test_unlisted_device_stays_out_without_auto_join() {
    let router = SessionRouter::new(RouterSettings {
        auto_join: false,
        ..Default::default()
    });
    router.set_active_outputs(["Digital Piano"]);

    let synth = FakeOutput::new("Synth");
    router.attach(synth.port());
    assert!(router.session().active_outputs.is_empty());

    router.route_note(NoteKind::Feedback, 60, 0.8, NoteLength::Sustain);
    assert!(synth.sent().is_empty());
}

#[test]
fn test_input_selection_is_idempotent() {
    let router = SessionRouter::new(RouterSettings {
        auto_join: false,
        ..Default::default()
    });
    let keys = FakeInput::new("LUMI Keys");
    router.attach(keys.port());
    assert_eq!(keys.listeners(), 0);

    router.set_active_inputs(["LUMI Keys"]);
    router.set_active_inputs(["LUMI Keys"]);
    assert_eq!(keys.subscribe_calls.load(Ordering::SeqCst), 1);
    assert_eq!(keys.listeners(), 1);
    assert_eq!(router.subscription_count(), 1);

    router.set_active_inputs(Vec::<String>::new());
    assert_eq!(keys.listeners(), 0);
    assert_eq!(router.subscription_count(), 0);
}

#[test]
fn test_input_notes_reach_receiver() {
    let router = SessionRouter::new(RouterSettings::default());
    let mut notes = router.take_note_receiver().unwrap();
    assert!(router.take_note_receiver().is_none());

    let keys = FakeInput::new("LUMI Keys");
    router.attach(keys.port());
    keys.play(61);

    let event = notes.try_recv().unwrap();
    assert_eq!(event.endpoint_id, "LUMI Keys");
    assert_eq!(event.note, 61);
    assert!(event.on);
}

#[test]
fn test_hotplug_replays_display_state() {
    let router = SessionRouter::new(RouterSettings::default());
    router.set_active_outputs(["LUMI Keys"]);

    // Nothing connected yet: state is only recorded
    let delivery = router.configure_key_scale(RootKey::D, Scale::Dorian);
    assert!(delivery.is_empty());

    let lumi = FakeOutput::new("LUMI Keys");
    let replay = router.handle_hotplug(HotplugEvent::Connected(lumi.port()));
    assert_eq!(replay.delivered, vec!["LUMI Keys".to_string()]);
    assert_eq!(
        lumi.sent(),
        vec![
            frame(Command::RootKey(RootKey::D)),
            frame(Command::Scale(Scale::Dorian)),
            frame(Command::Mode(Mode::Single)),
        ]
    );

    // Same port again changes nothing
    let again = router.handle_hotplug(HotplugEvent::Connected(lumi.port()));
    assert!(again.is_empty());
    assert_eq!(lumi.sent().len(), 3);

    router.handle_hotplug(HotplugEvent::Disconnected(lumi.endpoint.clone()));
    router.handle_hotplug(HotplugEvent::Disconnected(lumi.endpoint.clone()));
    assert!(router.primary_lighting_output().is_none());
    assert_eq!(router.session().preferred_outputs, vec!["LUMI Keys"]);

    let reconnected = FakeOutput::new("LUMI Keys");
    router.handle_hotplug(HotplugEvent::Connected(reconnected.port()));
    assert_eq!(reconnected.sent().len(), 3);
    assert_eq!(router.primary_lighting_output().unwrap().id, "LUMI Keys");
}

#[test]
fn test_input_reconnect_resubscribes() {
    let router = SessionRouter::new(RouterSettings::default());
    let first = FakeInput::new("LUMI Keys");
    router.attach(first.port());
    assert_eq!(first.listeners(), 1);

    router.handle_hotplug(HotplugEvent::Disconnected(first.endpoint.clone()));
    assert_eq!(first.listeners(), 0);
    assert!(router.session().active_inputs.is_empty());

    let second = FakeInput::new("LUMI Keys");
    router.handle_hotplug(HotplugEvent::Connected(second.port()));
    assert_eq!(second.listeners(), 1);
    assert!(router.session().is_active_input("LUMI Keys"));
}

#[test]
fn test_sustain_routing() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    router.start_sustain(60);
    router.start_sustain(60);
    assert_eq!(piano.sent(), vec![note_on(60), vec![0x80, 60, 0], note_on(60)]);
    assert_eq!(lumi.sent().len(), 3);

    piano.clear();
    assert!(router.stop_sustain(61).is_empty());
    assert!(piano.sent().is_empty());

    router.start_sustain(64);
    let delivery = router.stop_all_sustain();
    assert_eq!(delivery.delivered.len(), 2);
    assert_eq!(
        piano.sent(),
        vec![note_on(64), vec![0x80, 60, 0], vec![0x80, 64, 0]]
    );
    assert!(router.sounding_notes().is_empty());
}

#[test]
fn test_sustained_challenge_is_released_where_it_sounded() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    router.route_note(NoteKind::Challenge, 60, 0.8, NoteLength::Sustain);
    assert_eq!(router.sounding_notes(), vec![60]);

    let delivery = router.stop_sustain(60);
    assert_eq!(delivery.delivered, vec!["Digital Piano".to_string()]);
    assert_eq!(piano.sent(), vec![note_on(60), vec![0x80, 60, 0]]);
    assert!(router.sounding_notes().is_empty());

    piano.clear();
    router.route_note(NoteKind::Challenge, 62, 0.8, NoteLength::Sustain);
    router.route_note(NoteKind::Feedback, 64, 0.8, NoteLength::Sustain);
    router.stop_all_sustain();

    assert_eq!(
        piano.sent(),
        vec![note_on(62), note_on(64), vec![0x80, 62, 0], vec![0x80, 64, 0]]
    );
    assert_eq!(lumi.sent(), vec![note_on(64), vec![0x80, 64, 0]]);
}

#[test]
fn test_timed_note_without_runtime_is_released_by_stop_all() {
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&piano]);

    router.route_note(
        NoteKind::Challenge,
        67,
        0.8,
        NoteLength::Duration(Duration::from_millis(800)),
    );
    assert_eq!(piano.sent(), vec![note_on(67)]);

    let delivery = router.stop_all_sustain();
    assert_eq!(delivery.delivered, vec!["Digital Piano".to_string()]);
    assert_eq!(piano.sent(), vec![note_on(67), vec![0x80, 67, 0]]);
    assert!(router.stop_all_sustain().is_empty());
}

#[test]
fn test_hand_built_lighting_endpoint_gets_no_challenge() {
    let lumi = FakeOutput::with_endpoint(Endpoint {
        id: "lumi".into(),
        name: "LUMI Keys".into(),
        manufacturer: "ROLI".into(),
        direction: Direction::Output,
        kind: DeviceKind::Melodic,
        lighting: false,
    });
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    let delivery = router.route_note(NoteKind::Challenge, 60, 0.8, NoteLength::Sustain);
    assert_eq!(delivery.delivered, vec!["Digital Piano".to_string()]);
    assert!(lumi.sent().is_empty());

    router.set_primary_color(255, 0, 0);
    assert_eq!(lumi.sent().len(), 1);
    assert_eq!(piano.sent(), vec![note_on(60)]);
    assert_eq!(router.primary_lighting_output().unwrap().id, "lumi");
}

#[test]
fn test_highlight_and_clear() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    let delivery = router.highlight_scale(&[0, 2, 4, 5, 7, 9, 11], 60, 72);
    assert_eq!(delivery.delivered, vec!["LUMI Keys".to_string()]);
    let sent = lumi.sent();
    assert_eq!(sent.len(), 12);
    assert_eq!(sent[0], vec![0xF0, 0x00, 0x21, 0x10, 0x78, 60, 0x00, 0x01, 0x7F, 0xF7]);
    assert_eq!(sent[1], vec![0xF0, 0x00, 0x21, 0x10, 0x78, 61, 0, 0, 0, 0xF7]);
    assert!(router.display_state().highlight.is_some());
    assert!(piano.sent().is_empty());

    lumi.clear();
    router.clear_range(60, 72);
    assert_eq!(lumi.sent().len(), 12);
    assert!(lumi.sent().iter().all(|m| m[6..9] == [0, 0, 0]));
    assert!(router.display_state().highlight.is_none());
}

#[test]
fn test_reconfigure_resends_changed_settings() {
    let lumi = FakeOutput::new("LUMI Keys");
    let router = make_router(&[&lumi]);

    let unchanged = router.reconfigure(RouterSettings::default());
    assert!(unchanged.is_empty());

    router.reconfigure(RouterSettings {
        brightness: crate::lumi::Brightness::Half,
        ..Default::default()
    });
    assert_eq!(
        lumi.sent(),
        vec![frame(Command::Brightness(crate::lumi::Brightness::Half))]
    );
}

#[tokio::test(start_paused = true)]
async fn test_timed_note_is_released() {
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&piano]);

    router.route_note(
        NoteKind::Challenge,
        67,
        0.8,
        NoteLength::Duration(Duration::from_millis(800)),
    );
    assert_eq!(piano.sent(), vec![note_on(67)]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(piano.sent().len(), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(piano.sent(), vec![note_on(67), vec![0x80, 67, 0]]);
}

#[tokio::test(start_paused = true)]
async fn test_replayed_timed_note_gets_full_hold() {
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&piano]);
    let hold = NoteLength::Duration(Duration::from_millis(800));
    let off = vec![0x80, 67, 0];

    router.route_note(NoteKind::Challenge, 67, 0.8, hold);
    tokio::time::sleep(Duration::from_millis(500)).await;
    router.route_note(NoteKind::Challenge, 67, 0.8, hold);
    assert_eq!(piano.sent(), vec![note_on(67), off.clone(), note_on(67)]);

    // The first timer is superseded
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(piano.sent().len(), 3);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        piano.sent(),
        vec![note_on(67), off.clone(), note_on(67), off]
    );
}

#[tokio::test(start_paused = true)]
async fn test_release_all_flushes_timed_notes() {
    let lumi = FakeOutput::new("LUMI Keys");
    let piano = FakeOutput::new("Digital Piano");
    let router = make_router(&[&lumi, &piano]);

    router.route_note(
        NoteKind::Feedback,
        72,
        0.8,
        NoteLength::Duration(Duration::from_secs(1)),
    );
    let delivery = router.stop_all_sustain();
    assert_eq!(delivery.delivered.len(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(piano.sent(), vec![note_on(72), vec![0x80, 72, 0]]);
    assert_eq!(lumi.sent(), vec![note_on(72), vec![0x80, 72, 0]]);
}

#[tokio::test(start_paused = true)]
async fn test_flash_feedback_returns_to_resting_color() {
    let lumi = FakeOutput::new("LUMI Keys");
    let router = make_router(&[&lumi]);

    assert!(router.flash_feedback(false).is_some());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        lumi.sent(),
        vec![frame(Command::PrimaryColor(palette::INCORRECT))]
    );

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(
        lumi.sent(),
        vec![
            frame(Command::PrimaryColor(palette::INCORRECT)),
            frame(Command::PrimaryColor(palette::BRIGHT_BLUE)),
        ]
    );
    assert_eq!(router.display_state().primary_color, Some(palette::BRIGHT_BLUE));
}

#[tokio::test(start_paused = true)]
async fn test_highlight_cancels_celebration() {
    let lumi = FakeOutput::new("LUMI Keys");
    let router = make_router(&[&lumi]);

    router.celebrate();
    tokio::time::sleep(Duration::from_millis(100)).await;
    router.highlight_scale(&[0, 4, 7], 60, 61);
    lumi.clear();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(lumi.sent().is_empty());
    assert!(!router.cancel_sequence());
}

const NAMES: [&str; 6] = [
    "LUMI Keys",
    "ROLI Block",
    "Digital Piano",
    "USB MIDI",
    "Nord Stage",
    "lumi keys 2",
];

proptest! {
    #[test]
    fn prop_challenge_never_reaches_lighting(
        picks in proptest::sample::subsequence(NAMES.to_vec(), 0..=NAMES.len()),
        notes in proptest::collection::btree_map(0u8..128, any::<bool>(), 1..20),
    ) {
        let outputs: Vec<Arc<FakeOutput>> = picks.iter().map(|n| FakeOutput::new(n)).collect();
        let router = SessionRouter::new(RouterSettings::default());
        for output in &outputs {
            router.attach(output.port());
        }

        for (note, challenge) in &notes {
            let kind = if *challenge { NoteKind::Challenge } else { NoteKind::Feedback };
            router.route_note(kind, *note, 0.5, NoteLength::Sustain);
        }
        router.stop_all_sustain();
        let feedback_count = notes.values().filter(|c| !**c).count();

        for output in &outputs {
            let sent = output.sent();
            if output.endpoint.lighting {
                prop_assert_eq!(sent.len(), 2 * feedback_count);
                prop_assert!(sent.iter().all(|msg| !notes[&msg[1]]));
            } else {
                prop_assert_eq!(sent.len(), 2 * notes.len());
            }
        }
    }
}
