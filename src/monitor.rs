//! Button monitor.
//!
//! A monitor claims one button pin as a pull-up input and turns its edges
//! into a single pass stream of [`Record`]s. The backend's poll callback
//! pushes every transition onto an unbounded queue; iterating the monitor
//! pops them, blocking while the queue is empty.
//!
//! Life cycle: `Idle` for the settle delay after start, then `Monitoring`,
//! then `Closed` for good. A monitor closes itself when a release arrives
//! more than `idle_timeout` after the last press; the timeout is measured
//! from the press, so one long press closes the monitor on release. The
//! queue keeps growing while nobody reads it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::Result;
use crate::gpio::{GpioBackend, Level, Mode, Pull};

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    pub idle_timeout: Duration,
    /// Time between claiming the pin and announcing `Monitoring`.
    pub settle_delay: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PressState {
    Released,
    Pressed,
}

impl PressState {
    /// Buttons pull up, so a low pin is a pressed button.
    pub fn from_level(level: Level) -> Self {
        match level {
            Level::Low => PressState::Pressed,
            Level::High => PressState::Released,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            PressState::Released => 0,
            PressState::Pressed => 1,
        }
    }
}

/// One transition, displayed as `"<pin>,<state>\n"`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub pin: u8,
    pub state: PressState,
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{},{}", self.pin, self.state.bit())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MonitorEvent {
    Monitoring(u8),
    PinChange(u8, PressState),
    End(u8),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Monitoring,
    Closed,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Press bookkeeping behind the idle timeout.
#[derive(Debug)]
pub struct Tracker {
    idle_timeout: Duration,
    last_press: Option<Instant>,
}

impl Tracker {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last_press: None,
        }
    }

    /// Feed one sampled state. Returns true when the monitor must close.
    pub fn sample(&mut self, state: PressState, now: Instant) -> bool {
        match state {
            PressState::Pressed => {
                self.last_press = Some(now);
                false
            }
            PressState::Released => match self.last_press.take() {
                Some(pressed) => now.saturating_duration_since(pressed) > self.idle_timeout,
                None => false,
            },
        }
    }
}

struct Inner {
    phase: Phase,
    pending: VecDeque<Record>,
    listeners: Vec<Sender<MonitorEvent>>,
    // the pin has been handed back to the backend
    released: bool,
}

impl Inner {
    fn emit(&mut self, event: MonitorEvent) {
        self.listeners.retain(|tx| tx.send(event).is_ok());
    }
}

struct Shared {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Travels inside the poll callback. Backends drop the callback when the pin
/// is closed, whoever closes it, so dropping this ends the monitor and marks
/// the pin as no longer ours.
struct Registration {
    pin: u8,
    shared: Arc<Shared>,
}

impl Registration {
    fn shared(&self) -> &Shared {
        &self.shared
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.released = true;
        if inner.phase != Phase::Closed {
            inner.phase = Phase::Closed;
            inner.emit(MonitorEvent::End(self.pin));
            self.shared.ready.notify_all();
            info!("button pin {} closed elsewhere, monitor ended", self.pin);
        }
    }
}

pub struct ButtonMonitor<B: GpioBackend + ?Sized + 'static> {
    pin: u8,
    backend: Arc<B>,
    shared: Arc<Shared>,
}

/// Start monitoring `pin` with the default timings.
pub fn monitor_button<B>(backend: Arc<B>, pin: u8) -> Result<ButtonMonitor<B>>
where
    B: GpioBackend + ?Sized + 'static,
{
    ButtonMonitor::start(backend, pin, MonitorConfig::default())
}

impl<B: GpioBackend + ?Sized + 'static> ButtonMonitor<B> {
    pub fn start(backend: Arc<B>, pin: u8, config: MonitorConfig) -> Result<Self> {
        Self::start_with_clock(backend, pin, config, Arc::new(SystemClock))
    }

    pub fn start_with_clock(
        backend: Arc<B>,
        pin: u8,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        backend.open(pin, Mode::Input, Pull::Up)?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                pending: VecDeque::new(),
                listeners: Vec::new(),
                released: false,
            }),
            ready: Condvar::new(),
        });

        let registration = Registration {
            pin,
            shared: shared.clone(),
        };
        let callback = on_edge(
            Arc::downgrade(&backend),
            registration,
            Tracker::new(config.idle_timeout),
            clock,
        );
        if let Err(e) = backend.poll(pin, Box::new(callback)) {
            backend.close(pin);
            return Err(e);
        }
        info!("monitoring button on pin {}", pin);

        if config.settle_delay.is_zero() {
            announce(pin, &shared);
        } else {
            let settling = Arc::downgrade(&shared);
            let delay = config.settle_delay;
            thread::spawn(move || {
                thread::sleep(delay);
                if let Some(shared) = settling.upgrade() {
                    announce(pin, &shared);
                }
            });
        }

        Ok(Self {
            pin,
            backend,
            shared,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// Transitions queued but not yet read.
    pub fn pending(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Receive the monitor's signals from now on.
    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = channel();
        self.shared.lock().listeners.push(tx);
        rx
    }

    /// Stop monitoring and release the pin. Records already queued can
    /// still be read. A pin that was already closed through the backend is
    /// left alone, since it may belong to someone else by now.
    pub fn close(&self) {
        let release = {
            let mut inner = self.shared.lock();
            if inner.phase != Phase::Closed {
                inner.phase = Phase::Closed;
                inner.emit(MonitorEvent::End(self.pin));
                self.shared.ready.notify_all();
            }
            !std::mem::replace(&mut inner.released, true)
        };
        if release {
            self.backend.close(self.pin);
            debug!("button monitor on pin {} closed", self.pin);
        }
    }
}

fn announce(pin: u8, shared: &Shared) {
    let mut inner = shared.lock();
    if inner.phase == Phase::Idle {
        inner.phase = Phase::Monitoring;
        inner.emit(MonitorEvent::Monitoring(pin));
        shared.ready.notify_all();
    }
}

fn on_edge<B>(
    backend: Weak<B>,
    registration: Registration,
    mut tracker: Tracker,
    clock: Arc<dyn Clock>,
) -> impl FnMut() + Send + 'static
where
    B: GpioBackend + ?Sized + 'static,
{
    move || {
        let pin = registration.pin;
        let shared = registration.shared();
        let backend = match backend.upgrade() {
            Some(backend) => backend,
            None => return,
        };
        let level = match backend.read(pin) {
            Ok(level) => level,
            Err(e) => {
                warn!("failed to sample button pin {}: {}", pin, e);
                return;
            }
        };
        let state = PressState::from_level(level);
        let expired = tracker.sample(state, clock.now());

        let release = {
            let mut inner = shared.lock();
            if inner.phase == Phase::Closed {
                debug!("edge on closed button pin {} ignored", pin);
                return;
            }
            inner.pending.push_back(Record { pin, state });
            inner.emit(MonitorEvent::PinChange(pin, state));
            debug!("pin {} changed to {}", pin, state.bit());
            if expired {
                inner.phase = Phase::Closed;
                inner.emit(MonitorEvent::End(pin));
            }
            shared.ready.notify_all();
            expired && !std::mem::replace(&mut inner.released, true)
        };
        if release {
            backend.close(pin);
            info!("button on pin {} idle, monitor closed", pin);
        }
    }
}

impl<B: GpioBackend + ?Sized + 'static> Iterator for ButtonMonitor<B> {
    type Item = Record;

    /// Blocks until the monitor is announced and a transition is queued.
    /// Ends once the monitor is closed and the queue is drained.
    fn next(&mut self) -> Option<Record> {
        let mut inner = self.shared.lock();
        loop {
            if inner.phase != Phase::Idle {
                if let Some(record) = inner.pending.pop_front() {
                    return Some(record);
                }
                if inner.phase == Phase::Closed {
                    return None;
                }
            }
            inner = self
                .shared
                .ready
                .wait(inner)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl<B: GpioBackend + ?Sized + 'static> Drop for ButtonMonitor<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::MemoryGpio;

    const PIN: u8 = 31;

    fn instant_config() -> MonitorConfig {
        MonitorConfig {
            settle_delay: Duration::ZERO,
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn record_format() {
        let record = Record { pin: 29, state: PressState::Pressed };
        assert_eq!(record.to_string(), "29,1\n");
        let record = Record { pin: 37, state: PressState::Released };
        assert_eq!(record.to_string(), "37,0\n");
    }

    #[test]
    fn tracker_closes_on_release_after_long_press() {
        let t0 = Instant::now();
        let mut tracker = Tracker::new(Duration::from_millis(5000));
        assert!(!tracker.sample(PressState::Pressed, t0));
        assert!(tracker.sample(PressState::Released, t0 + Duration::from_millis(5001)));
    }

    #[test]
    fn tracker_timeout_is_exclusive() {
        let t0 = Instant::now();
        let mut tracker = Tracker::new(Duration::from_millis(5000));
        tracker.sample(PressState::Pressed, t0);
        assert!(!tracker.sample(PressState::Released, t0 + Duration::from_millis(5000)));
    }

    #[test]
    fn tracker_forgets_press_after_release() {
        let t0 = Instant::now();
        let mut tracker = Tracker::new(Duration::from_secs(5));
        tracker.sample(PressState::Pressed, t0);
        assert!(!tracker.sample(PressState::Released, t0 + Duration::from_secs(1)));
        // no press since, so a late release does not close
        assert!(!tracker.sample(PressState::Released, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn tracker_measures_from_latest_press() {
        let t0 = Instant::now();
        let mut tracker = Tracker::new(Duration::from_secs(5));
        tracker.sample(PressState::Pressed, t0);
        tracker.sample(PressState::Pressed, t0 + Duration::from_secs(4));
        assert!(!tracker.sample(PressState::Released, t0 + Duration::from_secs(6)));
    }

    #[test]
    fn start_claims_pull_up_input() {
        let gpio = Arc::new(MemoryGpio::new());
        let monitor = ButtonMonitor::start(gpio.clone(), PIN, instant_config()).unwrap();
        assert_eq!(gpio.mode(PIN), Some((Mode::Input, Pull::Up)));
        assert!(gpio.has_callback(PIN));
        assert_eq!(monitor.phase(), Phase::Monitoring);
    }

    #[test]
    fn idle_until_settled() {
        let gpio = Arc::new(MemoryGpio::new());
        let config = MonitorConfig {
            settle_delay: Duration::from_secs(60),
            ..MonitorConfig::default()
        };
        let monitor = ButtonMonitor::start(gpio.clone(), PIN, config).unwrap();
        assert_eq!(monitor.phase(), Phase::Idle);
        // edges are queued even before the monitor is announced
        gpio.press(PIN);
        assert_eq!(monitor.pending(), 1);
    }

    #[test]
    fn close_releases_once() {
        let gpio = Arc::new(MemoryGpio::new());
        let monitor = ButtonMonitor::start(gpio.clone(), PIN, instant_config()).unwrap();
        monitor.close();
        monitor.close();
        drop(monitor);
        assert_eq!(gpio.closed(), vec![PIN]);
        assert!(!gpio.is_open(PIN));
    }

    #[test]
    fn backend_close_ends_the_monitor() {
        let gpio = Arc::new(MemoryGpio::new());
        let monitor = ButtonMonitor::start(gpio.clone(), PIN, instant_config()).unwrap();
        let events = monitor.subscribe();
        gpio.close(PIN);
        assert_eq!(monitor.phase(), Phase::Closed);
        assert_eq!(events.try_recv(), Ok(MonitorEvent::End(PIN)));
        drop(monitor);
        // the monitor does not close a pin it no longer holds
        assert_eq!(gpio.closed(), vec![PIN]);
    }
}
