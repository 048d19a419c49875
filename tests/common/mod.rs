//! scripted collaborators shared by the integration tests
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;

use walktrack::error::{SourceError, SubmitError};
use walktrack::hal::{Clock, SampleSource};
use walktrack::persist::{MemoryQueueStore, QueueStore};
use walktrack::remote::{ConnectivityProbe, RemoteSink};
use walktrack::{Collaborators, Measurement, OfflineQueueEngine};

pub fn t(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

pub fn m(count: u64, secs: i64) -> Measurement {
    Measurement::new("default", count, t(secs))
}

// ==============================================================================
// clock
// ==============================================================================

pub struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub fn current(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut now = self.0.lock().unwrap();
        *now = *now + by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// ==============================================================================
// sample source
// ==============================================================================

/// replays scripted reads; `Err(())` means the sensor is unavailable
#[derive(Default)]
pub struct ScriptedSource {
    reads: Mutex<VecDeque<Result<u64, ()>>>,
    windows: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
}

impl ScriptedSource {
    pub fn push(&self, read: Result<u64, ()>) {
        self.reads.lock().unwrap().push_back(read);
    }

    pub fn windows(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl SampleSource for ScriptedSource {
    async fn read_count(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64, SourceError> {
        self.windows.lock().unwrap().push((from, to));
        match self.reads.lock().unwrap().pop_front() {
            Some(Ok(n)) => Ok(n),
            Some(Err(())) => Err(SourceError::Unavailable("scripted outage".into())),
            None => Ok(0),
        }
    }
}

// ==============================================================================
// sink
// ==============================================================================

/// accepts everything unless a failure is scripted for the n-th call
#[derive(Default)]
pub struct ScriptedSink {
    failures: Mutex<VecDeque<(usize, SubmitError)>>,
    accepted: Mutex<Vec<Measurement>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSink {
    /// every submission waits for a permit on `gate`
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// fail the submission with zero-based call index `call`
    pub fn fail_call(&self, call: usize, error: SubmitError) {
        self.failures.lock().unwrap().push_back((call, error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn accepted(&self) -> Vec<Measurement> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSink for ScriptedSink {
    async fn submit(&self, measurement: &Measurement) -> Result<(), SubmitError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(pos) = failures.iter().position(|(c, _)| *c == call) {
                let (_, error) = failures.remove(pos).unwrap();
                return Err(error);
            }
        }

        self.accepted.lock().unwrap().push(measurement.clone());
        Ok(())
    }
}

// ==============================================================================
// probe
// ==============================================================================

pub struct ToggleProbe {
    connected: AtomicBool,
    checks: AtomicUsize,
}

impl ToggleProbe {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            checks: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for ToggleProbe {
    async fn is_connected(&self) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.connected.load(Ordering::SeqCst)
    }
}

// ==============================================================================
// harness
// ==============================================================================

pub struct Harness {
    pub engine: Arc<OfflineQueueEngine>,
    pub source: Arc<ScriptedSource>,
    pub store: Arc<MemoryQueueStore>,
    pub sink: Arc<ScriptedSink>,
    pub probe: Arc<ToggleProbe>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// the collaborators the engine was opened with
    pub fn parts(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            store: self.store.clone(),
            sink: self.sink.clone(),
            probe: self.probe.clone(),
            clock: self.clock.clone(),
        }
    }
}

pub struct HarnessBuilder {
    store: Arc<MemoryQueueStore>,
    sink: Arc<ScriptedSink>,
    connected: bool,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryQueueStore::new()),
            sink: Arc::new(ScriptedSink::default()),
            connected: true,
        }
    }

    pub fn store(mut self, store: Arc<MemoryQueueStore>) -> Self {
        self.store = store;
        self
    }

    pub fn sink(mut self, sink: ScriptedSink) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn offline(mut self) -> Self {
        self.connected = false;
        self
    }

    pub async fn build(self) -> Harness {
        let source = Arc::new(ScriptedSource::default());
        let probe = Arc::new(ToggleProbe::new(self.connected));
        let clock = Arc::new(ManualClock::new(t(1_700_000_000)));

        let parts = Collaborators {
            source: source.clone(),
            store: self.store.clone() as Arc<dyn QueueStore>,
            sink: self.sink.clone(),
            probe: probe.clone(),
            clock: clock.clone(),
        };
        let engine = Arc::new(OfflineQueueEngine::open("default", parts).await);

        Harness {
            engine,
            source,
            store: self.store,
            sink: self.sink,
            probe,
            clock,
        }
    }
}

pub async fn harness() -> Harness {
    HarnessBuilder::new().build().await
}
