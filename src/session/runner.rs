//! Sampling loop: one tick in flight at a time, driven by a timer thread.
//!
//! A tick grabs a frame, reads both fields and feeds the reading to the
//! tracker. Ticks never queue: a tick requested while another is running
//! returns `TickOutcome::Busy`. Stopping is safe at any point; a tick that
//! is already running finishes and its result is discarded.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::control::ControlCommand;
use super::source::FrameSource;
use super::state::TrackerState;
use super::tracker::{Ingest, ProgressView, Tracker};
use crate::config::TickInterval;
use crate::ocr::{read_frame, FieldRegions, Preprocessor, Recognizer};
use crate::progress::{PaceSeries, Reading};
use crate::snapshot::Snapshot;

/// Granularity at which the timer thread notices a stop request.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Result of one tick request.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Ingested(Ingest),
    /// The frame source had nothing to offer
    NoFrame,
    /// Another tick was still running; nothing was done
    Busy,
    /// A stop arrived while this tick ran; its reading was dropped
    Discarded,
    /// Frame capture or recognition failed; retried on the next tick
    Failed(String),
}

/// Everything a tick needs besides the tracker. Holding its lock is what
/// makes a tick in flight.
pub struct Sampler {
    preprocessor: Preprocessor,
    recognizer: Box<dyn Recognizer>,
    source: Box<dyn FrameSource>,
    regions: FieldRegions,
    /// Restart the recognizer after this many ticks (0 = never)
    restart_every: u64,
    ticks: u64,
}

impl Sampler {
    pub fn new(
        preprocessor: Preprocessor,
        recognizer: Box<dyn Recognizer>,
        source: Box<dyn FrameSource>,
        regions: FieldRegions,
        restart_every: u64,
    ) -> Self {
        Self {
            preprocessor,
            recognizer,
            source,
            regions,
            restart_every,
            ticks: 0,
        }
    }

    fn read_next(&mut self) -> Result<Option<Reading>> {
        let Some(frame) = self.source.next_frame()? else {
            return Ok(None);
        };
        let reading = read_frame(
            &mut self.preprocessor,
            self.recognizer.as_mut(),
            &frame,
            &self.regions,
        )?;
        Ok(Some(reading))
    }

    /// Between-tick maintenance.
    fn finish_tick(&mut self) {
        self.ticks += 1;
        if self.restart_every > 0 && self.ticks % self.restart_every == 0 {
            match self.recognizer.restart() {
                Ok(()) => log::info!("Recognizer restarted after {} ticks", self.ticks),
                Err(e) => log::warn!("Recognizer restart failed: {:#}", e),
            }
        }
    }
}

struct Shared {
    sampler: Mutex<Sampler>,
    tracker: Mutex<Tracker>,
    stop_requested: AtomicBool,
    loop_running: AtomicBool,
}

/// Cloneable handle to a sampler and its tracker.
#[derive(Clone)]
pub struct SamplerHandle {
    shared: Arc<Shared>,
}

impl SamplerHandle {
    pub fn new(sampler: Sampler, tracker: Tracker) -> Self {
        Self {
            shared: Arc::new(Shared {
                sampler: Mutex::new(sampler),
                tracker: Mutex::new(tracker),
                stop_requested: AtomicBool::new(false),
                loop_running: AtomicBool::new(false),
            }),
        }
    }

    fn tracker(&self) -> MutexGuard<'_, Tracker> {
        self.shared.tracker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs one tick now.
    pub fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now())
    }

    /// Runs one tick, stamping the reading with `now`.
    pub fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let mut sampler = match self.shared.sampler.try_lock() {
            Ok(sampler) => sampler,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => {
                log::debug!("Tick skipped: previous tick still running");
                return TickOutcome::Busy;
            }
        };
        self.run_tick(&mut sampler, now)
    }

    fn run_tick(&self, sampler: &mut Sampler, now: DateTime<Utc>) -> TickOutcome {
        let outcome = match sampler.read_next() {
            Ok(None) => TickOutcome::NoFrame,
            Err(e) => {
                log::warn!("Tick failed: {:#}", e);
                TickOutcome::Failed(format!("{:#}", e))
            }
            Ok(Some(_)) if self.shared.stop_requested.load(Ordering::SeqCst) => {
                log::debug!("Stop requested mid-tick, reading discarded");
                TickOutcome::Discarded
            }
            Ok(Some(reading)) => TickOutcome::Ingested(self.tracker().ingest(reading, now)),
        };

        if outcome != TickOutcome::NoFrame {
            sampler.finish_tick();
        }
        outcome
    }

    /// Starts the timer thread. Fails if one is already running.
    pub fn spawn(&self, interval: TickInterval) -> Result<JoinHandle<()>> {
        if self.shared.loop_running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("Sampling loop is already running"));
        }
        self.shared.stop_requested.store(false, Ordering::SeqCst);

        let handle = self.clone();
        log::info!("Sampling every {} s", interval.as_secs());

        Ok(thread::spawn(move || {
            handle.run_loop(interval.as_duration());
            handle.shared.loop_running.store(false, Ordering::SeqCst);
            log::info!("Sampling loop finished");
        }))
    }

    fn run_loop(&self, interval: Duration) {
        let mut next = Instant::now() + interval;
        loop {
            while Instant::now() < next {
                if self.stop_requested() {
                    return;
                }
                thread::sleep(STOP_POLL.min(next.saturating_duration_since(Instant::now())));
            }
            next += interval;

            if self.stop_requested() {
                return;
            }
            if self.state() == TrackerState::Running {
                if let TickOutcome::NoFrame = self.tick() {
                    log::info!("Frame source exhausted");
                    return;
                }
            }
        }
    }

    /// Asks the timer thread to exit. An in-flight tick finishes and is discarded.
    pub fn stop(&self) {
        self.shared.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_loop_running(&self) -> bool {
        self.shared.loop_running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TrackerState {
        self.tracker().state()
    }

    /// Starts or resumes tracking.
    pub fn start(&self, now: DateTime<Utc>) {
        self.tracker().start(now);
    }

    /// Flushes one tick out of schedule, then pauses. `None` if not running.
    ///
    /// A tick already in flight finishes first and is ingested while still
    /// running. No other tick can slip in between the flush and the pause.
    pub fn pause(&self, now: DateTime<Utc>) -> Option<TickOutcome> {
        if self.state() != TrackerState::Running {
            return None;
        }
        let mut sampler = self.shared.sampler.lock().unwrap_or_else(|e| e.into_inner());
        let flushed = self.run_tick(&mut sampler, now);
        self.tracker().pause(now);
        Some(flushed)
    }

    pub fn reset(&self) {
        self.tracker().reset();
    }

    /// Applies a control command. Returns the reply, if the command has one.
    pub fn apply(&self, command: ControlCommand, now: DateTime<Utc>) -> Option<&'static str> {
        match command {
            ControlCommand::Toggle => {
                if self.state() == TrackerState::Running {
                    self.pause(now);
                } else {
                    self.start(now);
                }
                None
            }
            ControlCommand::Reset => {
                self.reset();
                None
            }
            ControlCommand::Ping => Some("pong"),
        }
    }

    pub fn view(&self, now: DateTime<Utc>) -> ProgressView {
        self.tracker().view(now)
    }

    pub fn series(&self) -> PaceSeries {
        self.tracker().series()
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> Snapshot {
        self.tracker().snapshot(now)
    }

    pub fn restore(&self, snapshot: Snapshot) {
        self.tracker().restore(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::LEVEL_WHITELIST;
    use crate::ocr::RecognizeOptions;
    use crate::progress::ExpTable;
    use crate::session::tracker::TrackerSettings;
    use chrono::Duration as ChronoDuration;
    use image::{GrayImage, RgbaImage};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    /// Answers level and exp requests from fixed strings.
    struct Fixed {
        level: &'static str,
        exp: &'static str,
        restarts: Arc<AtomicUsize>,
    }

    impl Recognizer for Fixed {
        fn recognize(&mut self, _: &GrayImage, opts: RecognizeOptions<'_>) -> Result<String> {
            Ok(if opts.whitelist == Some(LEVEL_WHITELIST) { self.level } else { self.exp }.to_string())
        }

        fn restart(&mut self) -> Result<()> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Blank(usize);

    impl FrameSource for Blank {
        fn next_frame(&mut self) -> Result<Option<RgbaImage>> {
            if self.0 == 0 {
                return Ok(None);
            }
            self.0 -= 1;
            Ok(Some(RgbaImage::new(200, 100)))
        }
    }

    fn handle(recognizer: Box<dyn Recognizer>, frames: usize, restart_every: u64) -> SamplerHandle {
        let table = ExpTable::from_pairs([(1, 1000), (2, 1500)]).unwrap();
        SamplerHandle::new(
            Sampler::new(
                Preprocessor::default(),
                recognizer,
                Box::new(Blank(frames)),
                FieldRegions::default(),
                restart_every,
            ),
            Tracker::new(table, TrackerSettings::default()),
        )
    }

    fn fixed(level: &'static str, exp: &'static str) -> (Box<dyn Recognizer>, Arc<AtomicUsize>) {
        let restarts = Arc::new(AtomicUsize::new(0));
        (Box::new(Fixed { level, exp, restarts: restarts.clone() }), restarts)
    }

    #[test]
    fn test_tick_ingests_reading() {
        let (rec, _) = fixed("1", "500[50.00%]");
        let h = handle(rec, 2, 0);
        let now = Utc::now();
        h.start(now);

        match h.tick_at(now) {
            TickOutcome::Ingested(Ingest::Baseline(s)) => assert_eq!(s.exp_value, Some(500)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(h.tick_at(now), TickOutcome::Ingested(Ingest::Accepted(_))));
        assert_eq!(h.tick_at(now), TickOutcome::NoFrame);
    }

    #[test]
    fn test_recognizer_restarts_between_ticks() {
        let (rec, restarts) = fixed("1", "500[50.00%]");
        let h = handle(rec, 5, 2);
        for _ in 0..5 {
            h.tick();
        }
        assert_eq!(restarts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_pause_flushes_one_tick() {
        let (rec, _) = fixed("1", "500[50.00%]");
        let h = handle(rec, 3, 0);
        let now = Utc::now();
        assert_eq!(h.pause(now), None);

        h.start(now);
        h.tick_at(now);
        let flushed = h.pause(now + ChronoDuration::seconds(1));
        assert!(matches!(flushed, Some(TickOutcome::Ingested(Ingest::Accepted(_)))));
        assert_eq!(h.state(), TrackerState::Paused);
        assert_eq!(h.view(now).history_len, 1);
    }

    #[test]
    fn test_apply_commands() {
        let (rec, _) = fixed("1", "500[50.00%]");
        let h = handle(rec, 3, 0);
        let now = Utc::now();

        assert_eq!(h.apply(ControlCommand::Ping, now), Some("pong"));
        h.apply(ControlCommand::Toggle, now);
        assert_eq!(h.state(), TrackerState::Running);
        h.apply(ControlCommand::Toggle, now);
        assert_eq!(h.state(), TrackerState::Paused);
        h.apply(ControlCommand::Reset, now);
        assert_eq!(h.state(), TrackerState::Idle);
    }

    /// Blocks inside every `recognize` call until released. Reads level 1
    /// and plays back the exp strings in order.
    struct Gate {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
        exp: VecDeque<&'static str>,
    }

    impl Gate {
        fn new(entered: mpsc::Sender<()>, release: mpsc::Receiver<()>, exp: &[&'static str]) -> Self {
            Self { entered, release, exp: exp.iter().copied().collect() }
        }
    }

    impl Recognizer for Gate {
        fn recognize(&mut self, _: &GrayImage, opts: RecognizeOptions<'_>) -> Result<String> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            if opts.whitelist == Some(LEVEL_WHITELIST) {
                return Ok("1".to_string());
            }
            Ok(self.exp.pop_front().unwrap_or_default().to_string())
        }
    }

    #[test]
    fn test_busy_then_discarded_on_stop() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let h = handle(Box::new(Gate::new(entered_tx, release_rx, &[])), 5, 0);
        h.start(Utc::now());

        let worker = {
            let h = h.clone();
            thread::spawn(move || h.tick())
        };
        entered_rx.recv().unwrap();

        assert_eq!(h.tick(), TickOutcome::Busy);
        h.stop();

        // Let the level and exp reads finish
        for _ in 0..3 {
            let _ = release_tx.send(());
        }
        assert_eq!(worker.join().unwrap(), TickOutcome::Discarded);
        assert_eq!(h.view(Utc::now()).latest, None);
    }

    #[test]
    fn test_pause_waits_for_in_flight_tick() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let gate = Gate::new(entered_tx, release_rx, &["100[10.00%]", "500[50.00%]", "600[60.00%]"]);
        let h = handle(Box::new(gate), 5, 0);
        let t0 = Utc::now();
        h.start(t0);

        // Level and exp reads for the baseline tick
        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        assert!(matches!(h.tick_at(t0), TickOutcome::Ingested(Ingest::Baseline(_))));
        entered_rx.recv().unwrap();
        entered_rx.recv().unwrap();

        let worker = {
            let h = h.clone();
            thread::spawn(move || h.tick_at(t0 + ChronoDuration::seconds(1)))
        };
        entered_rx.recv().unwrap();

        let pauser = {
            let h = h.clone();
            thread::spawn(move || h.pause(t0 + ChronoDuration::seconds(2)))
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(h.state(), TrackerState::Running);

        // The in-flight tick, then the flush
        for _ in 0..4 {
            release_tx.send(()).unwrap();
        }
        assert!(matches!(worker.join().unwrap(), TickOutcome::Ingested(Ingest::Accepted(_))));
        assert!(matches!(
            pauser.join().unwrap(),
            Some(TickOutcome::Ingested(Ingest::Accepted(_)))
        ));

        let view = h.view(t0);
        assert_eq!(h.state(), TrackerState::Paused);
        assert_eq!(view.cum_exp_value, 500.0);
        assert_eq!(view.history_len, 2);
    }

    #[test]
    fn test_spawn_twice_fails() {
        let (rec, _) = fixed("1", "500[50.00%]");
        let h = handle(rec, 0, 0);
        let loop_thread = h.spawn(TickInterval::One).unwrap();
        assert!(h.spawn(TickInterval::One).is_err());
        h.stop();
        loop_thread.join().unwrap();
        assert!(!h.is_loop_running());
    }
}
