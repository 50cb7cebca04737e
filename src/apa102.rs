use log::trace;

use crate::error::Result;
use crate::gpio::{GpioBackend, Level};
use crate::pixel::Pixel;

/// Zero bits clocked out before the first pixel frame.
pub const START_FRAME_PULSES: usize = 32;
/// Zero bits clocked out after the last pixel frame.
pub const END_FRAME_PULSES: usize = 36;
/// Top three bits of every pixel frame's first byte.
pub const LED_FRAME_HEADER: u8 = 0b1110_0000;

pub const BYTES_PER_PIXEL: usize = 4;

/// Apa102 LED strip buffer
///
/// Holds the pixel frames only. The start and end frames are not byte
/// aligned on this strip and are clocked out by [`ClockedWriter`].
pub struct Apa102 {
    length: usize,
    buffer: Vec<u8>,
}

impl Apa102 {
    /// Create a frame buffer for `length` pixels, all frames zeroed.
    pub fn new(length: usize) -> Self {
        Self {
            length,
            buffer: vec![0u8; BYTES_PER_PIXEL * length],
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Encode `frame` as `[header | brightness, blue, green, red]` per pixel.
    pub fn update(&mut self, frame: &[Pixel]) {
        for (led, e) in self.buffer.chunks_exact_mut(BYTES_PER_PIXEL).zip(frame) {
            led[0] = LED_FRAME_HEADER | e.brightness;
            led[1] = e.blue;
            led[2] = e.green;
            led[3] = e.red;
        }
    }

    pub fn get_buffer(&self) -> &[u8] {
        &self.buffer
    }
}

/// Bit-bangs bytes over a data + clock pin pair, MSB first. Data is set
/// while the clock is low and latched on the rising edge.
pub struct ClockedWriter<'a, B: GpioBackend + ?Sized> {
    backend: &'a B,
    data: u8,
    clock: u8,
}

impl<'a, B: GpioBackend + ?Sized> ClockedWriter<'a, B> {
    pub fn new(backend: &'a B, data: u8, clock: u8) -> Self {
        Self {
            backend,
            data,
            clock,
        }
    }

    fn tick(&self) -> Result<()> {
        self.backend.write(self.clock, Level::High)?;
        self.backend.write(self.clock, Level::Low)
    }

    /// Hold data low and pulse the clock `pulses` times.
    pub fn zeros(&self, pulses: usize) -> Result<()> {
        self.backend.write(self.data, Level::Low)?;
        for _ in 0..pulses {
            self.tick()?;
        }
        Ok(())
    }

    pub fn write_byte(&self, byte: u8) -> Result<()> {
        let mut byte = byte;
        for _ in 0..8 {
            self.backend
                .write(self.data, Level::from(byte & 0b1000_0000 != 0))?;
            self.backend.write(self.clock, Level::High)?;
            byte <<= 1;
            self.backend.write(self.clock, Level::Low)?;
        }
        Ok(())
    }

    /// Start frame, every pixel frame, end frame.
    pub fn write_frame(&self, leds: &Apa102) -> Result<()> {
        self.zeros(START_FRAME_PULSES)?;
        for &byte in leds.get_buffer() {
            self.write_byte(byte)?;
        }
        self.zeros(END_FRAME_PULSES)?;
        trace!("wrote {} pixel frames", leds.len());
        Ok(())
    }
}
