//! # Tuning Session Module
//!
//! Owns one decision engine per tuning session and wires it to the outside
//! world:
//! - **Producer**: the pitch detector pushes observations through an
//!   [`ObservationSender`] into a bounded crossbeam channel
//! - **Worker Thread**: a dedicated thread drains the channel and processes
//!   observations one at a time under the engine lock
//! - **Consumers**: every emitted state is stored in an `ArcSwap` snapshot
//!   and sent to each subscriber channel
//!
//! `stop()` takes the engine lock, so after it returns no observation can
//! mutate the engine or reach a subscriber until the next `start()`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, TrySendError, select};
use parking_lot::Mutex;

use crate::PitchObservation;
use crate::engine::{EngineConfig, TuningDecisionEngine, TuningState};
use crate::error::{Result, TunerError};
use crate::harmonic::HarmonicCorrector;
use crate::instrument::{InstrumentProfile, StringTarget};

/// Default number of observations buffered between producer and worker.
pub const DEFAULT_INTAKE_CAPACITY: usize = 64;

#[derive(Debug, Default)]
struct IntakeCounters {
    submitted: AtomicU64,
    handled: AtomicU64,
    dropped: AtomicU64,
}

/// State shared between the session handle and its worker thread.
struct Shared {
    engine: Mutex<TuningDecisionEngine>,
    snapshot: ArcSwap<TuningState>,
    subscribers: Mutex<Vec<Sender<TuningState>>>,
    counters: Arc<IntakeCounters>,
}

impl Shared {
    fn handle(&self, observation: &PitchObservation) {
        {
            let mut engine = self.engine.lock();
            if let Some(state) = engine.process(observation) {
                // Published under the engine lock so stop() cannot interleave.
                self.publish(state);
            }
        }
        self.counters.handled.fetch_add(1, Ordering::AcqRel);
    }

    fn publish(&self, state: TuningState) {
        self.snapshot.store(Arc::new(state.clone()));
        self.subscribers
            .lock()
            .retain(|tx| tx.send(state.clone()).is_ok());
    }
}

/// Producer handle for pushing observations into a session.
///
/// Cheap to clone; one per producer thread.
#[derive(Debug, Clone)]
pub struct ObservationSender {
    tx: Sender<PitchObservation>,
    counters: Arc<IntakeCounters>,
}

impl ObservationSender {
    /// Queues an observation, blocking while the intake is full.
    ///
    /// Nothing drains the intake while the session is stopped, so on a
    /// stopped session with a full intake this blocks until `start()` or
    /// until the session is dropped. Producers that must not wait use
    /// [`try_submit`](Self::try_submit).
    pub fn submit(&self, observation: PitchObservation) -> Result<()> {
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        self.tx.send(observation).map_err(|_| {
            self.counters.submitted.fetch_sub(1, Ordering::AcqRel);
            TunerError::IntakeClosed
        })
    }

    /// Queues an observation without blocking.
    ///
    /// Meant for real-time callbacks: when the intake is full the frame is
    /// dropped and `false` is returned.
    pub fn try_submit(&self, observation: PitchObservation) -> bool {
        self.counters.submitted.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(observation) {
            Ok(()) => true,
            Err(err) => {
                self.counters.submitted.fetch_sub(1, Ordering::AcqRel);
                if let TrySendError::Full(_) = err {
                    let before = self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                    if before == 0 {
                        log::warn!("[SESSION] Intake full, dropping observations");
                    } else {
                        log::trace!("[SESSION] Dropped observation ({} total)", before + 1);
                    }
                }
                false
            }
        }
    }

    /// Number of observations dropped by `try_submit` so far.
    pub fn dropped(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }
}

/// Worker thread management structure.
#[derive(Debug)]
struct SessionWorker {
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

/// A tuning session: one engine, one worker thread, any number of consumers.
pub struct TuningSession {
    shared: Arc<Shared>,
    intake_tx: Sender<PitchObservation>,
    intake_rx: Receiver<PitchObservation>,
    worker: Option<SessionWorker>,
}

impl TuningSession {
    /// Creates a stopped session for `profile`.
    pub fn new(profile: Arc<InstrumentProfile>, config: EngineConfig) -> Result<Self> {
        Self::with_capacity(profile, config, DEFAULT_INTAKE_CAPACITY)
    }

    /// Creates a stopped session with a custom intake capacity.
    pub fn with_capacity(
        profile: Arc<InstrumentProfile>,
        config: EngineConfig,
        capacity: usize,
    ) -> Result<Self> {
        let engine = TuningDecisionEngine::new(profile, config)?;
        let (intake_tx, intake_rx) = crossbeam_channel::bounded(capacity.max(1));
        Ok(Self {
            shared: Arc::new(Shared {
                engine: Mutex::new(engine),
                snapshot: ArcSwap::from_pointee(TuningState::default()),
                subscribers: Mutex::new(Vec::new()),
                counters: Arc::new(IntakeCounters::default()),
            }),
            intake_tx,
            intake_rx,
            worker: None,
        })
    }

    /// Resets the engine and begins processing observations.
    ///
    /// Observations still queued from a previous run are discarded.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_none() {
            let stale = self.intake_rx.try_iter().count() as u64;
            if stale > 0 {
                log::debug!("[SESSION] Discarding {} stale observations", stale);
                self.shared
                    .counters
                    .handled
                    .fetch_add(stale, Ordering::AcqRel);
            }
        }

        {
            let mut engine = self.shared.engine.lock();
            engine.start();
            self.shared.snapshot.store(Arc::new(TuningState::default()));
        }

        if self.worker.is_none() {
            let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
            let shared = Arc::clone(&self.shared);
            let intake = self.intake_rx.clone();
            let handle = thread::Builder::new()
                .name("tuning-session".to_string())
                .spawn(move || run_worker(shared, intake, shutdown_rx))
                .map_err(|e| TunerError::WorkerSpawn(e.to_string()))?;
            self.worker = Some(SessionWorker {
                shutdown_tx,
                thread_handle: Some(handle),
            });
        }

        log::info!(
            "[SESSION] Started tuning session for '{}'",
            self.shared.engine.lock().profile().id()
        );
        Ok(())
    }

    /// Stops the session and discards the engine state.
    ///
    /// Safe to call while an observation is being processed: that
    /// observation either completes before this returns or is discarded.
    pub fn stop(&mut self) {
        {
            let mut engine = self.shared.engine.lock();
            if !engine.is_running() && self.worker.is_none() {
                return;
            }
            engine.stop();
            self.shared.snapshot.store(Arc::new(TuningState::default()));
        }

        if let Some(mut worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(());
            if let Some(handle) = worker.thread_handle.take() {
                if handle.join().is_err() {
                    log::error!("[SESSION] Worker thread panicked");
                }
            }
        }
        log::info!("[SESSION] Stopped tuning session");
    }

    pub fn is_active(&self) -> bool {
        self.worker.is_some()
    }

    /// A producer handle for this session's intake.
    pub fn observation_sender(&self) -> ObservationSender {
        ObservationSender {
            tx: self.intake_tx.clone(),
            counters: Arc::clone(&self.shared.counters),
        }
    }

    /// Registers a consumer. Every state emitted from now on is sent to it.
    ///
    /// The channel is unbounded: a consumer must keep draining it or drop the
    /// receiver, which unregisters it on the next publish. At most one state
    /// is queued per observation handled.
    pub fn subscribe(&self) -> Receiver<TuningState> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// The most recently published state.
    pub fn snapshot(&self) -> Arc<TuningState> {
        self.shared.snapshot.load_full()
    }

    pub fn instrument(&self) -> Arc<InstrumentProfile> {
        Arc::clone(self.shared.engine.lock().profile())
    }

    /// Switches the instrument; applies from the next observation.
    pub fn set_profile(&self, profile: Arc<InstrumentProfile>) {
        log::info!("[SESSION] Instrument set to '{}'", profile.id());
        self.shared.engine.lock().set_profile(profile);
    }

    pub fn set_config(&self, config: EngineConfig) -> Result<()> {
        self.shared.engine.lock().set_config(config)
    }

    pub fn set_corrector(&self, corrector: HarmonicCorrector) {
        self.shared.engine.lock().set_corrector(corrector);
    }

    /// Pins the active instrument's string called `name`.
    pub fn pin_string(&self, name: &str) -> Result<StringTarget> {
        let mut engine = self.shared.engine.lock();
        let target = lookup_string(engine.profile(), name)?;
        engine.pin(target.clone());
        Ok(target)
    }

    /// Pins `name`, or releases the pin if `name` is already pinned.
    ///
    /// # Returns
    /// * `Ok(true)` if a pin is active afterwards
    pub fn toggle_pin(&self, name: &str) -> Result<bool> {
        let mut engine = self.shared.engine.lock();
        let target = lookup_string(engine.profile(), name)?;
        Ok(engine.toggle_pin(target))
    }

    pub fn unpin(&self) {
        self.shared.engine.lock().unpin();
    }

    pub fn pinned(&self) -> Option<StringTarget> {
        self.shared.engine.lock().pinned().cloned()
    }

    /// Waits until every submitted observation has been handled.
    ///
    /// # Returns
    /// * `true` if the intake drained within `timeout`
    pub fn wait_until_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let counters = &self.shared.counters;
        loop {
            if counters.handled.load(Ordering::Acquire) >= counters.submitted.load(Ordering::Acquire)
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for TuningSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lookup_string(profile: &InstrumentProfile, name: &str) -> Result<StringTarget> {
    profile
        .string_by_name(name)
        .cloned()
        .ok_or_else(|| TunerError::UnknownString {
            profile: profile.id().to_string(),
            string: name.to_string(),
        })
}

fn run_worker(shared: Arc<Shared>, intake: Receiver<PitchObservation>, shutdown: Receiver<()>) {
    log::debug!("[SESSION] Worker thread running");
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(intake) -> msg => match msg {
                Ok(observation) => shared.handle(&observation),
                Err(_) => break,
            },
        }
    }
    log::debug!("[SESSION] Worker thread exiting");
}
