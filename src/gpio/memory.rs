//! In-memory GPIO backend.
//!
//! Records every write so a rendered frame can be inspected bit by bit, and
//! lets input levels be driven by hand. Used by the tests and by the CLI's
//! `memory` backend for dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use thiserror::Error;

use super::{GpioBackend, Level, Mode, PollCallback, Pull};
use crate::error::{Error, Result};

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("pin is not open")]
    NotOpen,
    #[error("pin is not an output")]
    NotOutput,
    #[error("pin is not an input")]
    NotInput,
}

/// One recorded bus operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Write(u8, Level),
    Close(u8),
}

#[derive(Copy, Clone, Debug)]
struct Line {
    mode: Mode,
    pull: Pull,
}

#[derive(Default)]
struct State {
    lines: HashMap<u8, Line>,
    levels: HashMap<u8, Level>,
    callbacks: HashMap<u8, PollCallback>,
    history: Vec<Event>,
    ever_opened: HashSet<u8>,
}

#[derive(Default)]
pub struct MemoryGpio {
    state: Mutex<State>,
}

impl MemoryGpio {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive the level an input pin reads back.
    pub fn set_level(&self, pin: u8, level: Level) {
        self.state().levels.insert(pin, level);
    }

    /// Fire the poll callback of `pin`, as an edge would. Returns whether a
    /// callback was registered.
    pub fn trigger(&self, pin: u8) -> bool {
        // the callback reads (and may close) the pin, so it runs unlocked
        let callback = self.state().callbacks.remove(&pin);
        let mut callback = match callback {
            Some(callback) => callback,
            None => return false,
        };
        callback();
        let mut state = self.state();
        if state.lines.contains_key(&pin) && !state.callbacks.contains_key(&pin) {
            state.callbacks.insert(pin, callback);
        } else {
            // closed or replaced from inside the callback
            drop(state);
            drop(callback);
        }
        true
    }

    /// Pull a pull-up button low and fire its edge.
    pub fn press(&self, pin: u8) -> bool {
        self.set_level(pin, Level::Low);
        self.trigger(pin)
    }

    pub fn release(&self, pin: u8) -> bool {
        self.set_level(pin, Level::High);
        self.trigger(pin)
    }

    pub fn is_open(&self, pin: u8) -> bool {
        self.state().lines.contains_key(&pin)
    }

    pub fn was_opened(&self, pin: u8) -> bool {
        self.state().ever_opened.contains(&pin)
    }

    pub fn mode(&self, pin: u8) -> Option<(Mode, Pull)> {
        self.state().lines.get(&pin).map(|l| (l.mode, l.pull))
    }

    pub fn has_callback(&self, pin: u8) -> bool {
        self.state().callbacks.contains_key(&pin)
    }

    /// Writes and closes interleaved in the order they happened.
    pub fn history(&self) -> Vec<Event> {
        self.state().history.clone()
    }

    /// Every `close` call, in order, including ones for pins never opened.
    pub fn closed(&self) -> Vec<u8> {
        self.state()
            .history
            .iter()
            .filter_map(|event| match *event {
                Event::Close(pin) => Some(pin),
                Event::Write(..) => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.state()
            .history
            .iter()
            .filter_map(|event| match *event {
                Event::Write(pin, level) => Some((pin, level)),
                Event::Close(_) => None,
            })
            .collect()
    }

    /// Replay the recorded writes as a clocked bus: the data level at each
    /// rising clock edge is one bit.
    pub fn clocked_bits(&self, data: u8, clock: u8) -> Vec<bool> {
        let mut data_level = Level::Low;
        let mut clock_level = Level::Low;
        let mut bits = Vec::new();
        for (pin, level) in self.writes() {
            if pin == data {
                data_level = level;
            } else if pin == clock {
                if clock_level.is_low() && level.is_high() {
                    bits.push(data_level.is_high());
                }
                clock_level = level;
            }
        }
        bits
    }

    fn line(state: &State, pin: u8) -> Result<Line> {
        state
            .lines
            .get(&pin)
            .copied()
            .ok_or_else(|| Error::gpio(pin, MemoryError::NotOpen))
    }
}

/// Pack MSB first bits into bytes. Trailing bits that do not fill a byte
/// are dropped.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    bits.chunks_exact(8)
        .map(|byte| byte.iter().fold(0u8, |acc, &bit| (acc << 1) | bit as u8))
        .collect()
}

impl GpioBackend for MemoryGpio {
    fn open(&self, pin: u8, mode: Mode, pull: Pull) -> Result<()> {
        let mut state = self.state();
        if state.lines.contains_key(&pin) {
            return Err(Error::PinUnavailable(pin));
        }
        debug!("memory gpio: open pin {} as {:?} ({:?})", pin, mode, pull);
        state.lines.insert(pin, Line { mode, pull });
        state.ever_opened.insert(pin);
        if mode == Mode::Input && !state.levels.contains_key(&pin) {
            let idle = Level::from(pull == Pull::Up);
            state.levels.insert(pin, idle);
        }
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> Result<()> {
        let mut state = self.state();
        if Self::line(&state, pin)?.mode != Mode::Output {
            return Err(Error::gpio(pin, MemoryError::NotOutput));
        }
        state.levels.insert(pin, level);
        state.history.push(Event::Write(pin, level));
        Ok(())
    }

    fn read(&self, pin: u8) -> Result<Level> {
        let state = self.state();
        Self::line(&state, pin)?;
        Ok(state.levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    fn poll(&self, pin: u8, callback: PollCallback) -> Result<()> {
        let mut state = self.state();
        if Self::line(&state, pin)?.mode != Mode::Input {
            return Err(Error::gpio(pin, MemoryError::NotInput));
        }
        let replaced = state.callbacks.insert(pin, callback);
        // a callback may lock its owner when dropped
        drop(state);
        drop(replaced);
        Ok(())
    }

    fn close(&self, pin: u8) {
        let mut state = self.state();
        state.history.push(Event::Close(pin));
        let callback = state.callbacks.remove(&pin);
        if state.lines.remove(&pin).is_some() {
            debug!("memory gpio: closed pin {}", pin);
        } else {
            warn!("memory gpio: close on pin {} which is not open", pin);
        }
        drop(state);
        drop(callback);
    }
}
