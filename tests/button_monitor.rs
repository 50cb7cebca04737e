use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use phatbeat::monitor::ManualClock;
use phatbeat::pins::{PLAY_PAUSE_PIN, POWER_PIN};
use phatbeat::{
    ButtonMonitor, Error, MemoryGpio, MonitorConfig, MonitorEvent, Phase, PressState, Strip,
};

fn config() -> MonitorConfig {
    MonitorConfig {
        idle_timeout: Duration::from_millis(5000),
        settle_delay: Duration::ZERO,
    }
}

fn start(gpio: &Arc<MemoryGpio>, clock: &Arc<ManualClock>) -> ButtonMonitor<MemoryGpio> {
    ButtonMonitor::start_with_clock(gpio.clone(), PLAY_PAUSE_PIN, config(), clock.clone()).unwrap()
}

#[test]
fn quick_press_and_release() {
    let gpio = Arc::new(MemoryGpio::new());
    let clock = Arc::new(ManualClock::new());
    let mut monitor = start(&gpio, &clock);

    gpio.press(PLAY_PAUSE_PIN);
    clock.advance(Duration::from_millis(300));
    gpio.release(PLAY_PAUSE_PIN);

    assert_eq!(monitor.phase(), Phase::Monitoring);
    assert_eq!(monitor.next().unwrap().to_string(), "31,1\n");
    assert_eq!(monitor.next().unwrap().to_string(), "31,0\n");
    assert!(gpio.is_open(PLAY_PAUSE_PIN));
}

#[test]
fn long_press_closes_after_draining() {
    let gpio = Arc::new(MemoryGpio::new());
    let clock = Arc::new(ManualClock::new());
    let monitor = start(&gpio, &clock);

    gpio.press(PLAY_PAUSE_PIN);
    clock.advance(Duration::from_millis(5001));
    gpio.release(PLAY_PAUSE_PIN);

    assert_eq!(monitor.phase(), Phase::Closed);
    assert!(!gpio.is_open(PLAY_PAUSE_PIN));
    // later edges go nowhere
    assert!(!gpio.press(PLAY_PAUSE_PIN));

    let records: Vec<String> = monitor.map(|r| r.to_string()).collect();
    assert_eq!(records, vec!["31,1\n", "31,0\n"]);
}

#[test]
fn release_without_press_keeps_monitoring() {
    let gpio = Arc::new(MemoryGpio::new());
    let clock = Arc::new(ManualClock::new());
    let mut monitor = start(&gpio, &clock);

    clock.advance(Duration::from_secs(30));
    gpio.release(PLAY_PAUSE_PIN);
    assert_eq!(monitor.phase(), Phase::Monitoring);
    let record = monitor.next().unwrap();
    assert_eq!(record.state, PressState::Released);
}

#[test]
fn signals_reach_subscribers() {
    let gpio = Arc::new(MemoryGpio::new());
    let clock = Arc::new(ManualClock::new());
    let config = MonitorConfig {
        settle_delay: Duration::from_millis(20),
        ..config()
    };
    let monitor =
        ButtonMonitor::start_with_clock(gpio.clone(), POWER_PIN, config, clock.clone()).unwrap();
    let events = monitor.subscribe();

    assert_eq!(
        events.recv_timeout(Duration::from_secs(5)).unwrap(),
        MonitorEvent::Monitoring(POWER_PIN)
    );
    gpio.press(POWER_PIN);
    clock.advance(Duration::from_secs(6));
    gpio.release(POWER_PIN);

    let rest: Vec<_> = events.try_iter().collect();
    assert_eq!(
        rest,
        vec![
            MonitorEvent::PinChange(POWER_PIN, PressState::Pressed),
            MonitorEvent::PinChange(POWER_PIN, PressState::Released),
            MonitorEvent::End(POWER_PIN),
        ]
    );
}

#[test]
fn next_waits_for_settle_delay() {
    let gpio = Arc::new(MemoryGpio::new());
    let config = MonitorConfig {
        settle_delay: Duration::from_millis(100),
        ..config()
    };
    let started = Instant::now();
    let mut monitor = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config).unwrap();
    gpio.press(PLAY_PAUSE_PIN);

    assert_eq!(monitor.next().unwrap().state, PressState::Pressed);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(monitor.phase(), Phase::Monitoring);
}

#[test]
fn next_blocks_until_an_edge() {
    let gpio = Arc::new(MemoryGpio::new());
    let mut monitor = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();

    let pusher = gpio.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        pusher.press(PLAY_PAUSE_PIN);
    });

    let record = monitor.next().unwrap();
    assert_eq!(record.pin, PLAY_PAUSE_PIN);
    assert_eq!(record.state, PressState::Pressed);
    handle.join().unwrap();
}

#[test]
fn close_ends_the_stream() {
    let gpio = Arc::new(MemoryGpio::new());
    let clock = Arc::new(ManualClock::new());
    let mut monitor = start(&gpio, &clock);

    gpio.press(PLAY_PAUSE_PIN);
    monitor.close();
    assert_eq!(monitor.phase(), Phase::Closed);
    assert!(!gpio.is_open(PLAY_PAUSE_PIN));
    // already queued records survive the close
    assert_eq!(monitor.next().unwrap().state, PressState::Pressed);
    assert!(monitor.next().is_none());
    assert!(monitor.next().is_none());
}

#[test]
fn pin_already_claimed() {
    let gpio = Arc::new(MemoryGpio::new());
    let _first = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();
    assert!(matches!(
        ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()),
        Err(Error::PinUnavailable(PLAY_PAUSE_PIN))
    ));
}

#[test]
fn dropping_releases_the_pin() {
    let gpio = Arc::new(MemoryGpio::new());
    let monitor = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();
    drop(monitor);
    assert!(!gpio.is_open(PLAY_PAUSE_PIN));
    assert!(!gpio.has_callback(PLAY_PAUSE_PIN));
}

#[test]
fn strip_teardown_ends_a_running_monitor() {
    let gpio = Arc::new(MemoryGpio::new());
    let strip = Strip::init(gpio.clone(), None).unwrap();
    let mut monitor = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();

    let waiter = thread::spawn(move || {
        let records: Vec<_> = monitor.by_ref().collect();
        (records, monitor.phase())
    });
    thread::sleep(Duration::from_millis(50));
    strip.teardown(false).unwrap();

    let (records, phase) = waiter.join().unwrap();
    assert!(records.is_empty());
    assert_eq!(phase, Phase::Closed);
}

#[test]
fn stale_monitor_leaves_a_reclaimed_pin_alone() {
    let gpio = Arc::new(MemoryGpio::new());
    let strip = Strip::init(gpio.clone(), None).unwrap();
    let mut old = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();
    gpio.press(PLAY_PAUSE_PIN);
    strip.teardown(false).unwrap();
    assert_eq!(old.phase(), Phase::Closed);

    let mut fresh = ButtonMonitor::start(gpio.clone(), PLAY_PAUSE_PIN, config()).unwrap();
    // the old stream still drains what it saw
    assert_eq!(old.next().unwrap().state, PressState::Pressed);
    assert!(old.next().is_none());
    drop(old);

    assert!(gpio.is_open(PLAY_PAUSE_PIN));
    assert!(gpio.has_callback(PLAY_PAUSE_PIN));
    assert_eq!(fresh.phase(), Phase::Monitoring);
    gpio.release(PLAY_PAUSE_PIN);
    assert_eq!(fresh.next().unwrap().state, PressState::Released);
}
