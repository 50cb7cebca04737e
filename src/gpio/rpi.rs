//! Raspberry Pi backend on top of rppal.
//!
//! rppal addresses lines by BCM number, so every physical pin is translated
//! through [`bcm_line`]. Polling uses rppal's asynchronous interrupts on both
//! edges. The callback runs on rppal's interrupt thread with no lock held,
//! so it may read or close the pin it watches.

use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, warn};
use rppal::gpio::{self as hw, Gpio, InputPin, OutputPin, Trigger};

use super::{GpioBackend, Level, Mode, PollCallback, Pull};
use crate::error::{Error, Result};
use crate::pins::bcm_line;

thread_local! {
    // set while a poll callback runs on this interrupt thread
    static IN_INTERRUPT: Cell<bool> = Cell::new(false);
}

enum Line {
    Input(InputPin),
    Output(OutputPin),
}

impl Line {
    fn level(&self) -> Level {
        match self {
            Line::Input(pin) => Level::from(pin.is_high()),
            Line::Output(pin) => Level::from(pin.is_set_high()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn misuse(pin: u8, kind: io::ErrorKind, msg: &str) -> Error {
    Error::gpio(pin, io::Error::new(kind, msg.to_owned()))
}

/// Disarm and drop a line taken out of the table. Clearing an interrupt
/// joins its thread and drops the callback.
fn release(pin: u8, line: Line) {
    if let Line::Input(mut input) = line {
        if let Err(e) = input.clear_async_interrupt() {
            warn!("rpi gpio: failed to clear interrupt on pin {}: {}", pin, e);
        }
    }
    debug!("rpi gpio: closed pin {}", pin);
}

pub struct RppalGpio {
    gpio: Gpio,
    lines: Mutex<HashMap<u8, Line>>,
}

impl RppalGpio {
    pub fn new() -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| Error::gpio(0, e))?;
        Ok(Self {
            gpio,
            lines: Mutex::new(HashMap::new()),
        })
    }
}

impl GpioBackend for RppalGpio {
    fn open(&self, pin: u8, mode: Mode, pull: Pull) -> Result<()> {
        let bcm = bcm_line(pin).ok_or(Error::UnknownPin(pin))?;
        let mut lines = lock(&self.lines);
        if lines.contains_key(&pin) {
            return Err(Error::PinUnavailable(pin));
        }
        let raw = self.gpio.get(bcm).map_err(|e| Error::gpio(pin, e))?;
        let line = match (mode, pull) {
            (Mode::Output, _) => Line::Output(raw.into_output()),
            (Mode::Input, Pull::Up) => Line::Input(raw.into_input_pullup()),
            (Mode::Input, Pull::Down) => Line::Input(raw.into_input_pulldown()),
            (Mode::Input, Pull::None) => Line::Input(raw.into_input()),
        };
        debug!("rpi gpio: open pin {} (bcm {}) as {:?} ({:?})", pin, bcm, mode, pull);
        lines.insert(pin, line);
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> Result<()> {
        match lock(&self.lines).get_mut(&pin) {
            Some(Line::Output(out)) => {
                out.write(match level {
                    Level::Low => hw::Level::Low,
                    Level::High => hw::Level::High,
                });
                Ok(())
            }
            _ => Err(misuse(pin, io::ErrorKind::Other, "pin is not an open output")),
        }
    }

    fn read(&self, pin: u8) -> Result<Level> {
        lock(&self.lines)
            .get(&pin)
            .map(Line::level)
            .ok_or_else(|| misuse(pin, io::ErrorKind::NotFound, "pin is not open"))
    }

    fn poll(&self, pin: u8, mut callback: PollCallback) -> Result<()> {
        // re-arming joins the old interrupt thread, whose callback may be
        // waiting on the table, so the line is armed outside the lock
        let line = lock(&self.lines).remove(&pin);
        let mut input = match line {
            Some(Line::Input(input)) => input,
            Some(other) => {
                lock(&self.lines).insert(pin, other);
                return Err(misuse(pin, io::ErrorKind::Other, "pin is not an open input"));
            }
            None => return Err(misuse(pin, io::ErrorKind::NotFound, "pin is not open")),
        };
        let armed = input.set_async_interrupt(Trigger::Both, move |_| {
            IN_INTERRUPT.with(|flag| flag.set(true));
            callback();
            IN_INTERRUPT.with(|flag| flag.set(false));
        });
        lock(&self.lines).insert(pin, Line::Input(input));
        armed.map_err(|e| Error::gpio(pin, e))?;
        debug!("rpi gpio: interrupt armed on pin {}", pin);
        Ok(())
    }

    fn close(&self, pin: u8) {
        let line = lock(&self.lines).remove(&pin);
        match line {
            // the interrupt thread cannot join itself
            Some(line) if IN_INTERRUPT.with(Cell::get) => {
                thread::spawn(move || release(pin, line));
            }
            Some(line) => release(pin, line),
            None if bcm_line(pin).is_none() => {
                warn!("rpi gpio: close on pin {} which is not a gpio pin", pin);
            }
            None => {}
        }
    }
}
