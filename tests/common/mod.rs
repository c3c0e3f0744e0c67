//! Shared test utilities
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use earbud_anc::audio::{AdaptiveParams, AncInstance, AudioSubsystem, GainPath, TuningKind};
use earbud_anc::config::MicConfig;
use earbud_anc::peer::PeerLink;
use earbud_anc::persist::{MemorySessionStore, SessionData, SessionStore};
use earbud_anc::quiet_mode::QuietModeRecord;
use earbud_anc::sim::WALL_CLOCK_ORIGIN;
use earbud_anc::timer::VirtualTimer;
use earbud_anc::{AncManager, AncMode, Collaborators, Config, Event, Notification};
use tokio::sync::broadcast;

/// One call made on the audio subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCall {
    Initialise(AncMode),
    EnableHardware,
    EnableHardwareMuted,
    DisableHardware,
    SetMode(AncMode),
    SetModeIdentifier(AncMode),
    ApplyModeLive(AncMode),
    GentleMute,
    QuietModeOn,
    QuietModeOff,
    SetGain(AncInstance, GainPath, u8),
    EnableAdaptive(AdaptiveParams),
    DisableAdaptive,
    UpdateInEar(bool),
    ApplyPathGains,
    ClockBoost(bool),
    AttachTuning(TuningKind),
    DetachTuning,
    EnterTuning(TuningKind, u32),
    ExitTuning(TuningKind),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub calls: Vec<(Duration, AudioCall)>,
    pub fail_initialise: bool,
    pub fail_enable: bool,
    pub fail_disable: bool,
    pub fail_set_mode: bool,
    pub adaptive_active: bool,
    pub gains: HashMap<(AncInstance, GainPath), u8>,
    pub ff_gain: u8,
}

/// Audio subsystem that records every call with its virtual timestamp
#[derive(Debug, Clone)]
pub struct MockAudio {
    state: Arc<Mutex<MockState>>,
    timer: VirtualTimer,
}

impl MockAudio {
    pub fn new(timer: VirtualTimer) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                ff_gain: 100,
                ..MockState::default()
            })),
            timer,
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<AudioCall> {
        self.with(|s| s.calls.iter().map(|(_, c)| *c).collect())
    }

    pub fn timed_calls(&self) -> Vec<(Duration, AudioCall)> {
        self.with(|s| s.calls.clone())
    }

    pub fn count(&self, call: AudioCall) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }

    /// Time of the first recorded `call`
    pub fn time_of(&self, call: AudioCall) -> Option<Duration> {
        self.with(|s| s.calls.iter().find(|(_, c)| *c == call).map(|(t, _)| *t))
    }

    pub fn clear(&self) {
        self.with(|s| s.calls.clear());
    }

    fn record(&self, call: AudioCall) {
        let now = self.timer.now();
        self.with(|s| s.calls.push((now, call)));
    }
}

impl AudioSubsystem for MockAudio {
    fn initialise(&mut self, _mics: &MicConfig, mode: AncMode) -> bool {
        self.record(AudioCall::Initialise(mode));
        !self.with(|s| s.fail_initialise)
    }

    fn enable_hardware(&mut self) -> bool {
        self.record(AudioCall::EnableHardware);
        !self.with(|s| s.fail_enable)
    }

    fn enable_hardware_muted(&mut self) -> bool {
        self.record(AudioCall::EnableHardwareMuted);
        !self.with(|s| s.fail_enable)
    }

    fn disable_hardware(&mut self) -> bool {
        self.record(AudioCall::DisableHardware);
        !self.with(|s| s.fail_disable)
    }

    fn set_mode(&mut self, mode: AncMode) -> bool {
        self.record(AudioCall::SetMode(mode));
        !self.with(|s| s.fail_set_mode)
    }

    fn set_mode_identifier(&mut self, mode: AncMode) {
        self.record(AudioCall::SetModeIdentifier(mode));
    }

    fn apply_mode_change_live(&mut self, mode: AncMode) {
        self.record(AudioCall::ApplyModeLive(mode));
    }

    fn enable_gentle_mute(&mut self) {
        self.record(AudioCall::GentleMute);
    }

    fn enable_quiet_mode(&mut self) {
        self.record(AudioCall::QuietModeOn);
    }

    fn disable_quiet_mode(&mut self) {
        self.record(AudioCall::QuietModeOff);
    }

    fn read_gain(&mut self, instance: AncInstance, path: GainPath) -> u8 {
        self.with(|s| s.gains.get(&(instance, path)).copied().unwrap_or(40))
    }

    fn set_gain(&mut self, instance: AncInstance, path: GainPath, gain: u8) -> bool {
        self.record(AudioCall::SetGain(instance, path, gain));
        self.with(|s| s.gains.insert((instance, path), gain));
        true
    }

    fn feed_forward_gain(&mut self) -> u8 {
        self.with(|s| s.ff_gain)
    }

    fn is_adaptive_active(&self) -> bool {
        self.state.lock().unwrap().adaptive_active
    }

    fn enable_adaptive(&mut self, params: AdaptiveParams) -> bool {
        self.record(AudioCall::EnableAdaptive(params));
        self.with(|s| s.adaptive_active = true);
        true
    }

    fn disable_adaptive(&mut self) {
        self.record(AudioCall::DisableAdaptive);
        self.with(|s| s.adaptive_active = false);
    }

    fn update_in_ear(&mut self, in_ear: bool) {
        self.record(AudioCall::UpdateInEar(in_ear));
    }

    fn apply_filter_path_gains(&mut self) {
        self.record(AudioCall::ApplyPathGains);
    }

    fn set_dsp_clock_boost(&mut self, boost: bool) {
        self.record(AudioCall::ClockBoost(boost));
    }

    fn attach_tuning_link(&mut self, kind: TuningKind) {
        self.record(AudioCall::AttachTuning(kind));
    }

    fn detach_tuning_link(&mut self) {
        self.record(AudioCall::DetachTuning);
    }

    fn enter_tuning(&mut self, kind: TuningKind, sample_rate: u32) {
        self.record(AudioCall::EnterTuning(kind, sample_rate));
    }

    fn exit_tuning(&mut self, kind: TuningKind) {
        self.record(AudioCall::ExitTuning(kind));
        if kind == TuningKind::Adaptive {
            self.with(|s| s.adaptive_active = false);
        }
    }
}

/// Peer link that keeps everything it was asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingPeer {
    sent: Arc<Mutex<Vec<QuietModeRecord>>>,
}

impl RecordingPeer {
    pub fn sent(&self) -> Vec<QuietModeRecord> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<QuietModeRecord> {
        self.sent.lock().unwrap().last().copied()
    }
}

impl PeerLink for RecordingPeer {
    fn send_record(&mut self, record: QuietModeRecord) {
        self.sent.lock().unwrap().push(record);
    }
}

/// Session store the test can inspect after handing it to the manager
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<Mutex<MemorySessionStore>>,
}

impl SharedStore {
    pub fn with_data(data: SessionData) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemorySessionStore::with_data(data))),
        }
    }

    pub fn data(&self) -> Option<SessionData> {
        self.inner.lock().unwrap().data()
    }

    pub fn saves(&self) -> usize {
        self.inner.lock().unwrap().saves()
    }
}

impl SessionStore for SharedStore {
    fn load(&mut self) -> earbud_anc::Result<Option<SessionData>> {
        self.inner.lock().unwrap().load()
    }

    fn save(&mut self, data: &SessionData) -> earbud_anc::Result<()> {
        self.inner.lock().unwrap().save(data)
    }
}

/// Single manager wired to mocks and a virtual timer
pub struct Rig {
    pub manager: AncManager,
    pub timer: VirtualTimer,
    pub audio: MockAudio,
    pub peer: RecordingPeer,
    pub store: SharedStore,
    pub notes: broadcast::Receiver<Notification>,
}

impl Rig {
    pub fn new(config: Config) -> Self {
        Self::with_store(config, SharedStore::default())
    }

    pub fn with_session(config: Config, data: SessionData) -> Self {
        Self::with_store(config, SharedStore::with_data(data))
    }

    fn with_store(config: Config, store: SharedStore) -> Self {
        let timer = VirtualTimer::new();
        let audio = MockAudio::new(timer.clone());
        let peer = RecordingPeer::default();
        let io = Collaborators {
            audio: Box::new(audio.clone()),
            store: Box::new(store.clone()),
            peer: Box::new(peer.clone()),
            clock: Box::new(timer.clock_bridge(WALL_CLOCK_ORIGIN)),
            timer: Box::new(timer.clone()),
        };
        let manager = AncManager::new(config, io);
        let notes = manager.subscribe();
        Self {
            manager,
            timer,
            audio,
            peer,
            store,
            notes,
        }
    }

    pub fn dispatch(&mut self, event: Event) -> earbud_anc::Result<()> {
        self.manager.dispatch(event)
    }

    /// Initialise and power on
    pub fn powered(config: Config) -> Self {
        let mut rig = Self::new(config);
        rig.dispatch(Event::Initialise).expect("initialise");
        rig.dispatch(Event::PowerOn).expect("power on");
        rig
    }

    /// Powered, enabled in the adaptive mode, adaptive processing running
    pub fn adaptive(config: Config) -> Self {
        let mut rig = Self::powered(config);
        rig.dispatch(Event::Enable).expect("enable");
        rig.run_for(Duration::ZERO);
        assert!(rig.audio.with(|s| s.adaptive_active));
        rig.drain_notes();
        rig
    }

    /// Fire every timer due up to `t`
    pub fn run_until(&mut self, t: Duration) {
        while let Some(at) = self.timer.next_deadline().filter(|at| *at <= t) {
            self.timer.advance_to(at);
            while let Some(kind) = self.timer.pop_due() {
                let _ = self.manager.dispatch(Event::TimerExpired(kind));
            }
        }
        self.timer.advance_to(t);
    }

    pub fn run_for(&mut self, d: Duration) {
        let t = self.timer.now() + d;
        self.run_until(t);
    }

    pub fn drain_notes(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notes.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Default config with a static (non-adaptive) filter setup
pub fn static_config() -> Config {
    Config {
        adaptive: false,
        ..Config::default()
    }
}

pub const fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}
