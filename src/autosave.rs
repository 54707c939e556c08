// File: src/autosave.rs
use crate::config::AutoSaveConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Source of the current time, replaceable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { now: Arc::new(Mutex::new(Instant::now())) }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

pub type SaveCallback = Box<dyn FnMut() + Send>;

/// Decides when dirty models get written in the background.
///
/// Saves happen no earlier than `min_interval` after the last one. Typing
/// activity pushes the save out by `postpone_delay`, up to `max_interval`
/// after the last save. A pause suppresses saving entirely until it has
/// been ticked away or resumed.
pub struct AutoSaveTimer {
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    max_interval: Duration,
    postpone_delay: Duration,
    tick: Duration,
    interval: Duration,
    last_save: Instant,
    pause: Duration,
    save: SaveCallback,
}

impl AutoSaveTimer {
    pub fn new(config: &AutoSaveConfig, clock: Arc<dyn Clock>, save: SaveCallback) -> Self {
        let min_interval = config.min_interval();
        let last_save = clock.now();
        Self {
            clock,
            min_interval,
            max_interval: config.max_interval().max(min_interval),
            postpone_delay: config.postpone_delay(),
            tick: config.tick(),
            interval: min_interval,
            last_save,
            pause: Duration::ZERO,
            save,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tick_period(&self) -> Duration {
        self.tick
    }

    pub fn remaining_pause(&self) -> Duration {
        self.pause
    }

    pub fn is_paused(&self) -> bool {
        !self.pause.is_zero()
    }

    /// Point in time the next save becomes due.
    pub fn next_save_due(&self) -> Instant {
        self.last_save + self.interval
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.last_save)
    }

    /// Suspends saving for `duration`, e.g. while a key is held down.
    pub fn pause(&mut self, duration: Duration) {
        self.pause = duration;
    }

    pub fn resume(&mut self) {
        self.pause = Duration::ZERO;
    }

    /// Moves the next save to at least `postpone_delay` from now, never
    /// beyond `max_interval` after the last save.
    pub fn postpone(&mut self) {
        let wanted = self.elapsed() + self.postpone_delay;
        if self.interval < wanted {
            self.interval = wanted.min(self.max_interval);
        }
    }

    /// Runs one timer period. Returns true when a save was triggered.
    pub fn on_tick(&mut self) -> bool {
        if self.elapsed() > self.interval && self.pause.is_zero() {
            info!(interval_secs = self.interval.as_secs(), "autosave");
            (self.save)();
            self.last_save = self.clock.now();
            self.interval = self.min_interval;
            return true;
        }
        if !self.pause.is_zero() {
            self.pause = self.pause.saturating_sub(self.tick);
            debug!(remaining_secs = self.pause.as_secs(), "autosave paused");
        }
        false
    }
}

/// Drives `on_tick` from a background thread until `shutdown` is set.
pub fn spawn_ticker(timer: Arc<Mutex<AutoSaveTimer>>, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
    let period = timer.lock().tick_period().max(Duration::from_millis(10));
    thread::spawn(move || {
        let step = period.min(Duration::from_millis(100));
        let mut waited = Duration::ZERO;
        while !shutdown.load(Ordering::Acquire) {
            thread::sleep(step);
            waited += step;
            if waited >= period {
                waited = Duration::ZERO;
                timer.lock().on_tick();
            }
        }
    })
}
