//! GPIO backend abstraction.
//!
//! The strip and the button monitors only ever talk to pins through
//! [`GpioBackend`]. Pins are identified by their physical header number.

use crate::error::Result;

pub mod memory;
#[cfg(feature = "rpi")]
pub mod rpi;

pub use memory::MemoryGpio;
#[cfg(feature = "rpi")]
pub use rpi::RppalGpio;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    pub fn is_low(self) -> bool {
        self == Level::Low
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    Input,
    Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    None,
}

/// Invoked on every edge of a polled pin. It carries no level; sample the
/// pin with [`GpioBackend::read`].
pub type PollCallback = Box<dyn FnMut() + Send + 'static>;

pub trait GpioBackend: Send + Sync {
    /// Claim `pin`. Fails with [`Error::PinUnavailable`](crate::Error::PinUnavailable)
    /// if it is already claimed.
    fn open(&self, pin: u8, mode: Mode, pull: Pull) -> Result<()>;

    fn write(&self, pin: u8, level: Level) -> Result<()>;

    fn read(&self, pin: u8) -> Result<Level>;

    /// Register an edge triggered callback on an input pin. Replaces any
    /// previous callback on that pin.
    fn poll(&self, pin: u8, callback: PollCallback) -> Result<()>;

    /// Release `pin` and drop its poll callback, with no backend lock held
    /// since the callback's owner may lock itself on drop. Closing a pin
    /// that was never opened is a no-op.
    fn close(&self, pin: u8);
}
