//! Presence polling state machine.
//!
//! A poller is either `Stopped` or `Polling`. While polling it owns at most
//! one timer; the next cycle is armed only after the current cycle's logic
//! has finished, so cycles never overlap. Every start or stop bumps a
//! generation counter, and a cycle applies its results only while its
//! generation is still current. A stop therefore never aborts an in-flight
//! request, it only discards what that request produces.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use busylight_common::{
    schedule, AvailabilityResolver, AvailabilityState, CycleOutcome, IndicatorChange,
    IndicatorId, IndicatorSet, PollCycleConfig, PresenceStatus, Resolution, Rgb,
};

use crate::{
    light::LightSink,
    slack::{PresenceSource, UpstreamError},
};

pub type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerPhase {
    Stopped,
    Polling,
}

struct PollerState {
    phase: PollerPhase,
    master_on: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
    last_outcome: CycleOutcome,
    current: AvailabilityState,
    label: Option<String>,
    color: Option<Rgb>,
}

impl PollerState {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.phase == PollerPhase::Polling
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    name: String,
    config: PollCycleConfig,
    resolver: AvailabilityResolver,
    source: Option<Arc<dyn PresenceSource>>,
    sink: Arc<dyn LightSink>,
    clock: Clock,
    state: Mutex<PollerState>,
    indicators: Mutex<IndicatorSet>,
    changes: broadcast::Sender<IndicatorChange>,
}

enum Fetched {
    Offline,
    Resolved(Resolution),
}

#[derive(Clone)]
pub struct PresencePoller {
    inner: Arc<Inner>,
}

impl PresencePoller {
    /// `source` is `None` when no credentials are configured; such a poller
    /// never leaves `Stopped`.
    pub fn new(
        name: impl Into<String>,
        config: PollCycleConfig,
        source: Option<Arc<dyn PresenceSource>>,
        sink: Arc<dyn LightSink>,
        clock: Clock,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let indicators = IndicatorSet::from_colors(&config.colors);
        let resolver = AvailabilityResolver::new(config.colors.clone());

        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                config,
                resolver,
                source,
                sink,
                clock,
                state: Mutex::new(PollerState {
                    phase: PollerPhase::Stopped,
                    master_on: false,
                    generation: 0,
                    timer: None,
                    last_outcome: CycleOutcome::NotRun,
                    current: AvailabilityState::Offline,
                    label: None,
                    color: None,
                }),
                indicators: Mutex::new(indicators),
                changes,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &PollCycleConfig {
        &self.inner.config
    }

    /// Indicator changes produced by reconciliation, one message per switch
    /// whose value actually changed.
    pub fn subscribe(&self) -> broadcast::Receiver<IndicatorChange> {
        self.inner.changes.subscribe()
    }

    /// Master indicator. Switching on starts polling with an immediate cycle;
    /// switching off cancels the pending timer and clears every indicator.
    pub async fn set_master(&self, on: bool) -> PollerPhase {
        if on {
            self.start().await
        } else {
            self.stop().await;
            PollerPhase::Stopped
        }
    }

    async fn start(&self) -> PollerPhase {
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.master_on = true;

            if state.phase == PollerPhase::Polling {
                return PollerPhase::Polling;
            }
            if self.inner.source.is_none() {
                warn!(
                    accessory = %self.inner.name,
                    "master switch on but no auth token configured; polling stays disabled"
                );
                return PollerPhase::Stopped;
            }

            state.phase = PollerPhase::Polling;
            state.generation += 1;
            state.generation
        };

        info!(accessory = %self.inner.name, "presence polling started");
        Inner::spawn_cycle(&self.inner, generation);
        PollerPhase::Polling
    }

    async fn stop(&self) {
        let mut state = self.inner.state.lock().await;
        state.master_on = false;
        if state.phase == PollerPhase::Polling {
            info!(accessory = %self.inner.name, "presence polling stopped");
        }
        state.phase = PollerPhase::Stopped;
        state.generation += 1;
        state.cancel_timer();
        state.current = AvailabilityState::Offline;
        state.label = None;
        state.color = None;

        // Cleared under the state lock.
        let changes = self.inner.indicators.lock().await.all_off();
        self.inner.publish(changes);
    }

    pub async fn indicators(&self) -> Vec<(IndicatorId, bool)> {
        let indicators = self.inner.indicators.lock().await;
        indicators
            .ids()
            .map(|id| (id.clone(), indicators.get(id).unwrap_or(false)))
            .collect()
    }

    pub async fn status(&self) -> PresenceStatus {
        let indicators = self.inner.indicators.lock().await.snapshot();
        let state = self.inner.state.lock().await;

        PresenceStatus {
            name: self.inner.name.clone(),
            master_on: state.master_on,
            polling: state.phase == PollerPhase::Polling,
            state: state.current.clone(),
            label: state.label.clone(),
            color: state.color,
            last_cycle: state.last_outcome.clone(),
            interval_minutes: self.inner.config.interval_minutes,
            indicators,
        }
    }
}

impl Inner {
    fn spawn_cycle(self: &Arc<Self>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = inner.run_cycle(generation).await;
            inner.finish_cycle(generation, outcome).await;
        });
    }

    /// Records the outcome and arms the single timer for the next cycle,
    /// unless the poller moved on while this cycle was running.
    async fn finish_cycle(self: &Arc<Self>, generation: u64, outcome: CycleOutcome) {
        let mut state = self.state.lock().await;

        if !state.is_current(generation) {
            debug!(accessory = %self.name, "stale cycle finished after stop");
            if state.phase == PollerPhase::Stopped {
                state.last_outcome = CycleOutcome::Discarded;
            }
            return;
        }
        state.last_outcome = outcome;

        let inner = Arc::clone(self);
        let interval = self.config.interval();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            inner.spawn_cycle(generation);
        });

        state.cancel_timer();
        state.timer = Some(timer);
    }

    async fn run_cycle(&self, generation: u64) -> CycleOutcome {
        let now = (self.clock)();
        let master_on = self.state.lock().await.master_on;
        let gate = schedule::evaluate(
            &now,
            &self.config.window,
            self.config.weekend_enabled,
            master_on,
        );

        if !gate.is_open() {
            if self.config.debug {
                info!(accessory = %self.name, reason = gate.as_str(), "presence check suppressed");
            }
            return self.suppress(generation).await;
        }

        match self.fetch().await {
            Ok(Fetched::Offline) => {
                if self.config.debug {
                    info!(accessory = %self.name, "upstream reports user offline, nothing to apply");
                }
                CycleOutcome::UpstreamOffline
            }
            Ok(Fetched::Resolved(resolution)) => self.apply(generation, resolution).await,
            Err(err) => {
                // Indicators keep their last state on upstream failure.
                if self.config.debug {
                    warn!(accessory = %self.name, "presence cycle failed: {err}");
                } else {
                    debug!(accessory = %self.name, "presence cycle failed: {err}");
                }
                CycleOutcome::Failed(err.to_string())
            }
        }
    }

    async fn fetch(&self) -> Result<Fetched, UpstreamError> {
        let Some(source) = self.source.as_ref() else {
            return Ok(Fetched::Offline);
        };

        let presence = source.presence().await?;
        if self.config.debug {
            info!(accessory = %self.name, "presence data {presence:?}");
        }
        if !presence.online {
            return Ok(Fetched::Offline);
        }

        let (profile, dnd) = tokio::join!(source.profile(), source.dnd_info());
        let (profile, dnd) = (profile?, dnd?);
        if self.config.debug {
            info!(accessory = %self.name, "profile data {profile:?}");
            info!(accessory = %self.name, "dnd data {dnd:?}");
        }

        Ok(Fetched::Resolved(
            self.resolver.resolve(&presence, &profile, &dnd),
        ))
    }

    async fn suppress(&self, generation: u64) -> CycleOutcome {
        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                return CycleOutcome::Discarded;
            }
            state.current = AvailabilityState::Offline;
            state.label = None;
            state.color = None;

            let changes = self
                .indicators
                .lock()
                .await
                .reconcile(&AvailabilityState::Offline, None);
            self.publish(changes);
        }

        if let Err(err) = self.sink.turn_off().await {
            self.light_failure("turn off", &err);
        }
        CycleOutcome::Suppressed
    }

    async fn apply(&self, generation: u64, resolution: Resolution) -> CycleOutcome {
        {
            let mut state = self.state.lock().await;
            if !state.is_current(generation) {
                return CycleOutcome::Discarded;
            }
            state.current = resolution.display_state();
            state.label = resolution.label.clone();
            state.color = Some(resolution.color);

            let changes = self
                .indicators
                .lock()
                .await
                .reconcile(&resolution.state, resolution.label.as_deref());
            self.publish(changes);
        }

        if let Err(err) = self.sink.set_color(resolution.color).await {
            self.light_failure("set color", &err);
        }
        CycleOutcome::Applied
    }

    fn publish(&self, changes: Vec<IndicatorChange>) {
        for change in changes {
            debug!(
                accessory = %self.name,
                indicator = %change.id.key(),
                on = change.on,
                "indicator changed"
            );
            // No subscribers is fine.
            let _ = self.changes.send(change);
        }
    }

    fn light_failure(&self, action: &str, err: &dyn std::error::Error) {
        if self.config.debug {
            warn!(accessory = %self.name, "busy light {action} failed: {err}");
        } else {
            debug!(accessory = %self.name, "busy light {action} failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex as StdMutex,
        time::Duration,
    };

    use async_trait::async_trait;
    use busylight_common::{DndPayload, PresencePayload, Profile, ProfilePayload};
    use chrono::TimeZone;
    use reqwest::StatusCode;

    use super::*;
    use crate::light::LightError;

    #[derive(Debug, Clone, PartialEq)]
    enum LightCall {
        Color(Rgb),
        Off,
    }

    #[derive(Default)]
    struct FakeLight {
        calls: StdMutex<Vec<LightCall>>,
        fail: bool,
    }

    impl FakeLight {
        fn calls(&self) -> Vec<LightCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LightSink for FakeLight {
        async fn set_color(&self, color: Rgb) -> Result<(), LightError> {
            self.calls.lock().unwrap().push(LightCall::Color(color));
            if self.fail {
                return Err(LightError::Status {
                    url: "http://light/color".to_string(),
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                });
            }
            Ok(())
        }

        async fn turn_off(&self) -> Result<(), LightError> {
            self.calls.lock().unwrap().push(LightCall::Off);
            Ok(())
        }
    }

    type Scripted = Result<PresencePayload, ()>;

    /// Upstream fake. Presence answers are scripted per cycle; once the
    /// script runs out the last answer repeats.
    struct FakeSource {
        presence: StdMutex<VecDeque<Scripted>>,
        last: StdMutex<Scripted>,
        status_text: Option<String>,
        snooze: bool,
        delay: Duration,
        presence_calls: StdMutex<u32>,
    }

    impl FakeSource {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                presence: StdMutex::new(script.into()),
                last: StdMutex::new(Ok(active())),
                status_text: None,
                snooze: false,
                delay: Duration::ZERO,
                presence_calls: StdMutex::new(0),
            }
        }

        fn presence_calls(&self) -> u32 {
            *self.presence_calls.lock().unwrap()
        }
    }

    fn active() -> PresencePayload {
        PresencePayload {
            online: true,
            presence: Some("active".to_string()),
        }
    }

    fn away() -> PresencePayload {
        PresencePayload {
            online: true,
            presence: Some("away".to_string()),
        }
    }

    fn transport_failure() -> UpstreamError {
        UpstreamError::Status {
            method: "users.getPresence",
            status: StatusCode::BAD_GATEWAY,
        }
    }

    #[async_trait]
    impl PresenceSource for FakeSource {
        async fn presence(&self) -> Result<PresencePayload, UpstreamError> {
            *self.presence_calls.lock().unwrap() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.presence.lock().unwrap().pop_front();
            let answer = match next {
                Some(answer) => {
                    *self.last.lock().unwrap() = answer.clone();
                    answer
                }
                None => self.last.lock().unwrap().clone(),
            };
            answer.map_err(|()| transport_failure())
        }

        async fn profile(&self) -> Result<ProfilePayload, UpstreamError> {
            Ok(ProfilePayload {
                profile: Some(Profile {
                    status_text: self.status_text.clone(),
                }),
            })
        }

        async fn dnd_info(&self) -> Result<DndPayload, UpstreamError> {
            Ok(DndPayload {
                snooze_enabled: self.snooze,
                dnd_enabled: self.snooze,
            })
        }
    }

    /// Wednesday noon.
    fn weekday_noon() -> Clock {
        Arc::new(|| {
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2026, 1, 7, 12, 0, 0)
                .unwrap()
        })
    }

    fn saturday_noon() -> Clock {
        Arc::new(|| {
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2026, 1, 10, 12, 0, 0)
                .unwrap()
        })
    }

    fn poller(
        config: PollCycleConfig,
        source: Arc<FakeSource>,
        light: Arc<FakeLight>,
        clock: Clock,
    ) -> PresencePoller {
        PresencePoller::new("Desk", config, Some(source as Arc<dyn PresenceSource>), light, clock)
    }

    /// Lets spawned tasks run without advancing much virtual time.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn first_cycle_runs_immediately_and_applies_color() {
        let source = Arc::new(FakeSource::new(vec![Ok(active())]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());
        let mut changes = poller.subscribe();

        assert_eq!(poller.set_master(true).await, PollerPhase::Polling);
        settle().await;

        assert_eq!(light.calls(), vec![LightCall::Color(Rgb::new(0, 144, 0))]);
        let status = poller.status().await;
        assert_eq!(status.state, AvailabilityState::Available);
        assert_eq!(status.last_cycle, CycleOutcome::Applied);
        assert_eq!(status.indicators.get("available"), Some(&true));

        let change = changes.recv().await.unwrap();
        assert_eq!(change.id, IndicatorId::Available);
        assert!(change.on);
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_repeat_once_per_interval() {
        let source = Arc::new(FakeSource::new(vec![Ok(active())]));
        let light = Arc::new(FakeLight::default());
        let config = PollCycleConfig::builder().interval_minutes(5).build();
        let poller = poller(config, source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        assert_eq!(source.presence_calls(), 1);

        tokio::time::sleep(4 * MINUTE).await;
        assert_eq!(source.presence_calls(), 1);

        tokio::time::sleep(MINUTE).await;
        settle().await;
        assert_eq!(source.presence_calls(), 2);

        tokio::time::sleep(10 * MINUTE).await;
        settle().await;
        assert_eq!(source.presence_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_interval_behaves_as_one_minute() {
        for requested in [0, -5] {
            let source = Arc::new(FakeSource::new(vec![Ok(active())]));
            let light = Arc::new(FakeLight::default());
            let config = PollCycleConfig::builder().interval_minutes(requested).build();
            let poller = poller(config, source.clone(), light, weekday_noon());

            poller.set_master(true).await;
            settle().await;
            tokio::time::sleep(MINUTE).await;
            settle().await;

            assert_eq!(source.presence_calls(), 2, "interval {requested}");
            poller.set_master(false).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_cycles() {
        let source = Arc::new(FakeSource::new(vec![Ok(active())]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        tokio::time::sleep(MINUTE).await;
        settle().await;

        assert_eq!(poller.set_master(false).await, PollerPhase::Stopped);
        let calls_at_stop = light.calls().len();
        let presence_at_stop = source.presence_calls();

        tokio::time::sleep(30 * MINUTE).await;

        assert_eq!(light.calls().len(), calls_at_stop);
        assert_eq!(source.presence_calls(), presence_at_stop);
        let status = poller.status().await;
        assert!(!status.polling);
        assert!(status.indicators.values().all(|on| !on));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_stop_keeps_new_cycle_indicators() {
        let source = Arc::new(FakeSource::new(vec![Ok(away()), Ok(active())]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light, weekday_noon());

        poller.set_master(true).await;
        settle().await;
        assert_eq!(poller.status().await.indicators.get("away"), Some(&true));

        let restarted = poller.clone();
        let (_, phase) = tokio::join!(poller.set_master(false), restarted.set_master(true));
        assert_eq!(phase, PollerPhase::Polling);
        settle().await;

        let status = poller.status().await;
        assert!(status.polling);
        assert_eq!(status.indicators.get("available"), Some(&true));
        assert_eq!(status.indicators.get("away"), Some(&false));
        assert_eq!(source.presence_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_results_are_discarded_after_stop() {
        let mut fake = FakeSource::new(vec![Ok(active())]);
        fake.delay = Duration::from_secs(5);
        let source = Arc::new(fake);
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        assert_eq!(source.presence_calls(), 1);

        poller.set_master(false).await;
        tokio::time::sleep(10 * MINUTE).await;

        assert!(light.calls().is_empty());
        assert_eq!(source.presence_calls(), 1);
        let status = poller.status().await;
        assert_eq!(status.last_cycle, CycleOutcome::Discarded);
        assert_eq!(status.state, AvailabilityState::Offline);
        assert!(status.indicators.values().all(|on| !on));
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_restart_keeps_a_single_timer() {
        let mut fake = FakeSource::new(vec![Ok(active())]);
        fake.delay = Duration::from_secs(5);
        let source = Arc::new(fake);
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        poller.set_master(false).await;
        poller.set_master(true).await;
        poller.set_master(true).await;

        // Two first cycles were started, only the second survives.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(source.presence_calls(), 2);
        assert_eq!(light.calls().len(), 1);

        // The next timer is armed only once a cycle completes, so with a 5s
        // upstream delay cycles start at ~65s and ~130s.
        tokio::time::sleep(3 * MINUTE).await;
        assert_eq!(source.presence_calls(), 4);
        assert_eq!(light.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn upstream_failure_keeps_indicators_and_keeps_polling() {
        let source = Arc::new(FakeSource::new(vec![
            Ok(away()),
            Err(()),
            Ok(active()),
        ]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        assert_eq!(poller.status().await.indicators.get("away"), Some(&true));

        tokio::time::sleep(MINUTE).await;
        settle().await;
        let status = poller.status().await;
        assert!(matches!(status.last_cycle, CycleOutcome::Failed(_)));
        assert_eq!(status.indicators.get("away"), Some(&true));
        assert_eq!(light.calls().len(), 1);

        tokio::time::sleep(MINUTE).await;
        settle().await;
        let status = poller.status().await;
        assert_eq!(status.last_cycle, CycleOutcome::Applied);
        assert_eq!(status.indicators.get("available"), Some(&true));
        assert_eq!(status.indicators.get("away"), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_upstream_is_a_no_op() {
        let source = Arc::new(FakeSource::new(vec![Ok(PresencePayload {
            online: false,
            presence: Some("away".to_string()),
        })]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source, light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;

        assert!(light.calls().is_empty());
        let status = poller.status().await;
        assert_eq!(status.last_cycle, CycleOutcome::UpstreamOffline);
        assert!(status.indicators.values().all(|on| !on));
    }

    #[tokio::test(start_paused = true)]
    async fn weekend_suppresses_and_turns_light_off() {
        let source = Arc::new(FakeSource::new(vec![Ok(active())]));
        let light = Arc::new(FakeLight::default());
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), saturday_noon());

        poller.set_master(true).await;
        settle().await;

        assert_eq!(source.presence_calls(), 0);
        assert_eq!(light.calls(), vec![LightCall::Off]);
        let status = poller.status().await;
        assert_eq!(status.last_cycle, CycleOutcome::Suppressed);
        assert_eq!(status.indicators.get("offline"), Some(&true));

        // Still scheduled while suppressed.
        tokio::time::sleep(MINUTE).await;
        settle().await;
        assert_eq!(light.calls(), vec![LightCall::Off, LightCall::Off]);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_activity_drives_its_own_switch() {
        let mut fake = FakeSource::new(vec![Ok(away())]);
        fake.status_text = Some("Lunch".to_string());
        let source = Arc::new(fake);
        let light = Arc::new(FakeLight::default());
        let config = PollCycleConfig::builder()
            .color("lunch", Rgb::new(0, 0, 255))
            .build();
        let poller = poller(config, source, light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;

        assert_eq!(light.calls(), vec![LightCall::Color(Rgb::new(0, 0, 255))]);
        let status = poller.status().await;
        assert_eq!(status.state, AvailabilityState::Custom("lunch".to_string()));
        assert_eq!(status.indicators.get("activity/lunch"), Some(&true));
        for canonical in ["offline", "away", "available", "donotdisturb"] {
            assert_eq!(status.indicators.get(canonical), Some(&false));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn light_failure_does_not_stop_polling() {
        let mut fake = FakeSource::new(vec![Ok(active())]);
        fake.snooze = true;
        let source = Arc::new(fake);
        let light = Arc::new(FakeLight {
            fail: true,
            ..FakeLight::default()
        });
        let poller = poller(PollCycleConfig::default(), source.clone(), light.clone(), weekday_noon());

        poller.set_master(true).await;
        settle().await;
        tokio::time::sleep(MINUTE).await;
        settle().await;

        assert_eq!(source.presence_calls(), 2);
        let status = poller.status().await;
        assert_eq!(status.state, AvailabilityState::DoNotDisturb);
        assert_eq!(status.last_cycle, CycleOutcome::Applied);
        assert_eq!(status.indicators.get("donotdisturb"), Some(&true));
    }

    #[tokio::test(start_paused = true)]
    async fn without_credentials_poller_stays_stopped() {
        let light = Arc::new(FakeLight::default());
        let poller = PresencePoller::new(
            "Desk",
            PollCycleConfig::default(),
            None,
            light.clone(),
            weekday_noon(),
        );

        assert_eq!(poller.set_master(true).await, PollerPhase::Stopped);
        tokio::time::sleep(5 * MINUTE).await;

        assert!(light.calls().is_empty());
        let status = poller.status().await;
        assert!(status.master_on);
        assert!(!status.polling);
    }
}
