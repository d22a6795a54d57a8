use crate::prelude::*;

use crate::scheduler::Sleeper;
use crate::solax::Fetch;
use std::sync::Arc;
use std::time::Duration;

/// Consecutive failed cycles tolerated before the inverter counts as offline.
pub const MAX_RETRIES: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// Values were published this cycle.
    Online,
    /// No data, but not enough failures in a row to call it offline yet.
    Retrying(u32),
    Offline,
    /// The inverter answered but its energy counters are still zero.
    Initializing,
}

// PollStats {{{
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PollStats {
    pub cycles: u64,
    pub online_cycles: u64,
    pub failed_cycles: u64,
    pub initializing_cycles: u64,
    pub offline_transitions: u64,
    pub values_published: u64,
    pub decode_errors: u64,
}

impl PollStats {
    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Cycles: {}", self.cycles);
        info!("    Online: {}", self.online_cycles);
        info!("    Failed: {}", self.failed_cycles);
        info!("    Initializing: {}", self.initializing_cycles);
        info!("  Offline transitions: {}", self.offline_transitions);
        info!("  Values published: {}", self.values_published);
        info!("  Sensor decode errors: {}", self.decode_errors);
    }
} // }}}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Intervals {
    pub normal: Duration,
    pub offline: Duration,
}

impl Intervals {
    pub fn from_config(inverter: &config::Inverter) -> Self {
        Self {
            normal: Duration::from_secs(inverter.poll_interval()),
            offline: Duration::from_secs(inverter.offline_interval()),
        }
    }

    pub fn delay(&self, state: State) -> Duration {
        match state {
            State::Online | State::Retrying(_) => self.normal,
            State::Offline | State::Initializing => self.offline,
        }
    }
}

/// Fetch, decode and publish, one cycle at a time.
pub struct Poller<F: Fetch, S: Sleeper> {
    fetcher: F,
    sleeper: S,
    registry: Arc<Registry>,
    ha: home_assistant::Config,
    channels: Channels,
    intervals: Intervals,
    failures: u32,
    stats: PollStats,
}

impl<F: Fetch, S: Sleeper> Poller<F, S> {
    pub fn new(
        fetcher: F,
        sleeper: S,
        registry: Arc<Registry>,
        ha: home_assistant::Config,
        channels: Channels,
        intervals: Intervals,
    ) -> Self {
        Self {
            fetcher,
            sleeper,
            registry,
            ha,
            channels,
            intervals,
            failures: 0,
            stats: PollStats::default(),
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn stats(&self) -> &PollStats {
        &self.stats
    }

    /// Poll until `shutdown` fires or its sender goes away.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "polling every {}s ({}s while offline or initializing)",
            self.intervals.normal.as_secs(),
            self.intervals.offline.as_secs()
        );

        loop {
            if !matches!(shutdown.try_recv(), Err(broadcast::error::TryRecvError::Empty)) {
                info!("poller shutdown requested");
                break;
            }

            let state = self.step().await;
            let delay = self.intervals.delay(state);
            trace!("state {:?}, sleeping {}s", state, delay.as_secs());

            tokio::select! {
                _ = self.sleeper.sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("poller shutdown requested");
                    break;
                }
            }
        }

        self.stats.print_summary();
        Ok(())
    }

    /// Run one cycle and report which state it left the poller in. Sleeping
    /// is left to the caller.
    pub async fn step(&mut self) -> State {
        self.stats.cycles += 1;

        let payload = match self.fetch().await {
            Ok(payload) => payload,
            Err(err) => return self.failed(err),
        };

        self.failures = 0;

        if self.registry.is_initializing(&payload) {
            info!(
                "Inverter is initializing. Retrying in {} seconds.",
                self.intervals.offline.as_secs()
            );
            self.stats.initializing_cycles += 1;
            return State::Initializing;
        }

        self.publish_values(&payload);
        self.stats.online_cycles += 1;

        State::Online
    }

    async fn fetch(&self) -> Result<RawPayload> {
        let body = self.fetcher.fetch().await?;
        Ok(RawPayload::decode(&body)?)
    }

    fn failed(&mut self, err: Error) -> State {
        self.failures = self.failures.saturating_add(1);
        self.stats.failed_cycles += 1;

        if self.failures <= MAX_RETRIES {
            debug!("no data from inverter ({}/{}): {}", self.failures, MAX_RETRIES, err);
            return State::Retrying(self.failures);
        }

        if self.failures == MAX_RETRIES + 1 {
            info!(
                "Inverter is offline. Retrying in {} seconds.",
                self.intervals.offline.as_secs()
            );
            self.stats.offline_transitions += 1;

            match self.registry.status() {
                Some(status) => {
                    let message = mqtt::Message::offline(&self.ha, status);
                    self.send(message);
                }
                None => warn!("no status sensor configured, offline state not published"),
            }
        } else {
            debug!("inverter still offline ({} failures): {}", self.failures, err);
        }

        State::Offline
    }

    fn publish_values(&mut self, payload: &RawPayload) {
        let registry = self.registry.clone();

        for descriptor in registry.iter() {
            match descriptor.derive(payload) {
                Ok(value) => {
                    let message = mqtt::Message::for_value(&self.ha, descriptor, &value);
                    if self.send(message) {
                        self.stats.values_published += 1;
                    }
                }
                Err(err) => {
                    self.stats.decode_errors += 1;
                    warn!("sensor {} ({}) skipped: {}", descriptor.name(), descriptor.id(), err);
                }
            }
        }
    }

    fn send(&self, message: mqtt::Message) -> bool {
        match self.channels.to_mqtt.send(mqtt::ChannelData::Message(message)) {
            Ok(_) => true,
            Err(err) => {
                warn!("send(to_mqtt) failed - channel closed? {:?}", err.0);
                false
            }
        }
    }
}
