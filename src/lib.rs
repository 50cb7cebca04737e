//! Driver for a 16 pixel APA102-style LED strip and six push buttons wired
//! to Raspberry Pi GPIO.
//!
//! ```no_run
//! use std::sync::Arc;
//! use phatbeat::{button_specs, monitor_button, Rgb, RppalGpio, Strip};
//!
//! # fn main() -> phatbeat::Result<()> {
//! let gpio = Arc::new(RppalGpio::new()?);
//! let strip = Strip::init(gpio.clone(), Some(0.5))?;
//! strip.set_channel(0, Rgb::new(255, 0, 0), None, true)?;
//!
//! for record in monitor_button(gpio, button_specs()[1].pin)? {
//!     print!("{}", record);
//! }
//! strip.teardown(true)?;
//! # Ok(())
//! # }
//! ```

pub mod apa102;
pub mod config;
pub mod error;
pub mod gpio;
pub mod monitor;
pub mod pins;
pub mod pixel;
pub mod strip;

pub use error::{Error, Result};
pub use gpio::{GpioBackend, Level, MemoryGpio, Mode, Pull};
#[cfg(feature = "rpi")]
pub use gpio::RppalGpio;
pub use monitor::{monitor_button, ButtonMonitor, MonitorConfig, MonitorEvent, Phase, PressState, Record};
pub use pins::{button_specs, ButtonName, ButtonSpec};
pub use pixel::{Pixel, Rgb, PIXELS_PER_CHANNEL, PIXEL_COUNT};
pub use strip::Strip;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
