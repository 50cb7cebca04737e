//! Strip controller: the public pixel API.
//!
//! Every mutation validates its arguments before touching the buffer. The
//! buffer and the encoded frame sit behind one mutex, held for the whole of
//! a render, so a frame on the wire always reflects a single buffer state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

use crate::apa102::{Apa102, ClockedWriter};
use crate::error::Result;
use crate::gpio::{GpioBackend, Mode, Pull};
use crate::pins::{all_pins, CLOCK_PIN, DATA_PIN};
use crate::pixel::{checked_brightness, Pixel, PixelBuffer, Rgb, DEFAULT_BRIGHTNESS, PIXEL_COUNT};

struct Frame {
    pixels: PixelBuffer,
    leds: Apa102,
    // pins handed back by teardown
    released: bool,
}

pub struct Strip<B: GpioBackend + ?Sized> {
    backend: Arc<B>,
    frame: Mutex<Frame>,
}

impl<B: GpioBackend + ?Sized> Strip<B> {
    /// Claim the data and clock pins and start with every pixel off.
    ///
    /// `brightness` is the fractional starting brightness; `None` uses the
    /// raw default of [`DEFAULT_BRIGHTNESS`].
    pub fn init(backend: Arc<B>, brightness: Option<f64>) -> Result<Self> {
        let brightness = checked_brightness(brightness)?.unwrap_or(DEFAULT_BRIGHTNESS);

        backend.open(DATA_PIN, Mode::Output, Pull::None)?;
        if let Err(e) = backend.open(CLOCK_PIN, Mode::Output, Pull::None) {
            backend.close(DATA_PIN);
            return Err(e);
        }
        info!(
            "strip ready: {} pixels, brightness {}, data pin {}, clock pin {}",
            PIXEL_COUNT, brightness, DATA_PIN, CLOCK_PIN
        );

        Ok(Self {
            backend,
            frame: Mutex::new(Frame {
                pixels: PixelBuffer::new(brightness),
                leds: Apa102::new(PIXEL_COUNT),
                released: false,
            }),
        })
    }

    fn frame(&self) -> MutexGuard<'_, Frame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn set_pixel(
        &self,
        index: usize,
        color: Rgb,
        brightness: Option<f64>,
        redraw: bool,
    ) -> Result<()> {
        let brightness = checked_brightness(brightness)?;
        let mut frame = self.frame();
        frame.pixels.set_pixel(index, color, brightness)?;
        self.finish(&mut frame, redraw)
    }

    /// Paint every pixel of channel 0 (pixels 0-7) or 1 (pixels 8-15).
    pub fn set_channel(
        &self,
        channel: usize,
        color: Rgb,
        brightness: Option<f64>,
        redraw: bool,
    ) -> Result<()> {
        let brightness = checked_brightness(brightness)?;
        let mut frame = self.frame();
        frame.pixels.set_channel(channel, color, brightness)?;
        self.finish(&mut frame, redraw)
    }

    pub fn set_all(&self, color: Rgb, brightness: Option<f64>, redraw: bool) -> Result<()> {
        let brightness = checked_brightness(brightness)?;
        let mut frame = self.frame();
        frame.pixels.set_all(color, brightness);
        self.finish(&mut frame, redraw)
    }

    /// Turn every pixel black. Brightness is kept.
    pub fn clear_all(&self, redraw: bool) -> Result<()> {
        self.set_all(Rgb::BLACK, None, redraw)
    }

    /// Clock the current buffer out to the strip. Blocks until the whole
    /// frame is written.
    pub fn render(&self) -> Result<()> {
        let mut frame = self.frame();
        self.draw(&mut frame)
    }

    /// Optionally turn the strip off, then release the data, clock and
    /// button pins. Pins are released even when the final render fails.
    ///
    /// Only the first call touches the pins. Later calls still clear the
    /// buffer when asked to, but there is nothing left to draw to.
    pub fn teardown(&self, turn_off: bool) -> Result<()> {
        let mut frame = self.frame();
        if turn_off {
            frame.pixels.set_all(Rgb::BLACK, None);
        }
        if frame.released {
            debug!("strip already released");
            return Ok(());
        }
        let cleared = if turn_off {
            self.draw(&mut frame)
        } else {
            Ok(())
        };
        for pin in all_pins() {
            self.backend.close(pin);
        }
        frame.released = true;
        info!("strip released");
        cleared
    }

    pub fn pixel(&self, index: usize) -> Option<Pixel> {
        self.frame().pixels.get(index).copied()
    }

    pub fn pixels(&self) -> PixelBuffer {
        self.frame().pixels.clone()
    }

    fn finish(&self, frame: &mut Frame, redraw: bool) -> Result<()> {
        if redraw {
            self.draw(frame)?;
        }
        Ok(())
    }

    fn draw(&self, frame: &mut Frame) -> Result<()> {
        frame.leds.update(frame.pixels.as_slice());
        ClockedWriter::new(&*self.backend, DATA_PIN, CLOCK_PIN).write_frame(&frame.leds)?;
        debug!("rendered {} pixels", frame.leds.len());
        Ok(())
    }
}
