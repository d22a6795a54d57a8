#![allow(dead_code)]

use solax_bridge::prelude::*;
use solax_bridge::poller::{Intervals, Poller};
use solax_bridge::scheduler::Sleeper;
use solax_bridge::solax::Fetch;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory();
impl Factory {
    /// A daytime reading: exporting, all counters populated.
    pub fn data() -> Vec<i64> {
        let mut data = vec![0; 100];
        data[0] = 2301; // AC voltage, 230.1 V
        data[1] = 23; // AC current, 2.3 A
        data[2] = 500; // AC power
        data[3] = 3105; // DC voltage 1
        data[5] = 18; // DC current 1
        data[7] = 560; // DC power 1
        data[9] = 5001; // 50.01 Hz
        data[10] = 2; // Normal
        data[11] = 12345; // energy total, 1234.5 kWh
        data[13] = 87; // energy today, 8.7 kWh
        data[48] = 40000; // feed-in, -25536 W
        data[50] = 123456; // feed-in energy
        data[52] = 654321; // consume energy
        data[55] = 41; // temperature
        data
    }

    pub fn information() -> Vec<i64> {
        let mut information = vec![0; 10];
        information[4] = 109;
        information[6] = 111;
        information
    }

    pub fn payload() -> RawPayload {
        RawPayload::from_sections(Self::data(), Self::information())
    }

    pub fn body_with(data: Vec<i64>, information: Vec<i64>) -> String {
        serde_json::json!({
            "sn": "SXXXXXXXXX",
            "ver": "3.003.02",
            "type": 4,
            "Data": data,
            "Information": information,
        })
        .to_string()
    }

    pub fn body() -> String {
        Self::body_with(Self::data(), Self::information())
    }

    /// Inverter up but not yet counting.
    pub fn initializing_body() -> String {
        let mut data = Self::data();
        data[50] = 0;
        data[52] = 0;
        Self::body_with(data, Self::information())
    }

    pub fn registry() -> Arc<Registry> {
        Arc::new(Registry::x1_mini_g3().unwrap())
    }

    pub fn ha() -> home_assistant::Config {
        home_assistant::Config::new(&config::HomeAssistant::default())
    }

    pub fn intervals() -> Intervals {
        Intervals {
            normal: Duration::from_secs(5),
            offline: Duration::from_secs(60),
        }
    }

    pub fn poller(fetcher: FakeFetch, channels: &Channels) -> Poller<FakeFetch, RecordingSleeper> {
        Poller::new(
            fetcher,
            RecordingSleeper::default(),
            Self::registry(),
            Self::ha(),
            channels.clone(),
            Self::intervals(),
        )
    }
}

/// Hands out scripted responses in order, then fails forever.
#[derive(Clone, Default)]
pub struct FakeFetch {
    responses: Arc<Mutex<VecDeque<Option<String>>>>,
    calls: Arc<Mutex<usize>>,
}

impl FakeFetch {
    pub fn new(responses: Vec<Option<String>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Fetch for FakeFetch {
    async fn fetch(&self) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        match self.responses.lock().unwrap().pop_front() {
            Some(Some(body)) => Ok(body),
            _ => bail!("connection refused"),
        }
    }
}

/// Returns immediately, remembering what it was asked to wait for. Optionally
/// requests shutdown after a number of sleeps.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    pub slept: Arc<Mutex<Vec<Duration>>>,
    shutdown: Option<(usize, broadcast::Sender<()>)>,
}

impl RecordingSleeper {
    pub fn shutdown_after(count: usize, tx: broadcast::Sender<()>) -> Self {
        Self {
            slept: Arc::default(),
            shutdown: Some((count, tx)),
        }
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        let count = {
            let mut slept = self.slept.lock().unwrap();
            slept.push(duration);
            slept.len()
        };

        if let Some((limit, tx)) = &self.shutdown {
            if count >= *limit {
                let _ = tx.send(());
            }
        }
    }
}

/// Everything currently queued for the MQTT sender.
pub fn drain_messages(rx: &mut broadcast::Receiver<mqtt::ChannelData>) -> Vec<mqtt::Message> {
    let mut r = Vec::new();
    while let Ok(data) = rx.try_recv() {
        if let mqtt::ChannelData::Message(message) = data {
            r.push(message);
        }
    }
    r
}
