use crate::error::{Error, Result};

/// Number of pixels on the strip.
pub const PIXEL_COUNT: usize = 16;
/// Pixels in each of the two channels.
pub const PIXELS_PER_CHANNEL: usize = 8;
pub const CHANNEL_COUNT: usize = PIXEL_COUNT / PIXELS_PER_CHANNEL;

/// Raw (already encoded) brightness every pixel starts with.
pub const DEFAULT_BRIGHTNESS: u8 = 7;

pub const MIN_BRIGHTNESS: f64 = 0.1;
pub const MAX_BRIGHTNESS: f64 = 1.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One LED: colour plus the encoded 5 bit global brightness.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pixel {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub brightness: u8,
}

impl Pixel {
    pub const fn off(brightness: u8) -> Self {
        Self {
            red: 0,
            green: 0,
            blue: 0,
            brightness,
        }
    }

    pub fn color(&self) -> Rgb {
        Rgb::new(self.red, self.green, self.blue)
    }

    fn paint(&mut self, color: Rgb, brightness: Option<u8>) {
        self.red = color.r;
        self.green = color.g;
        self.blue = color.b;
        if let Some(brightness) = brightness {
            self.brightness = brightness;
        }
    }
}

/// Fails with [`Error::InvalidBrightness`] outside `[0.1, 1.0]`.
pub fn validate_brightness(brightness: f64) -> Result<()> {
    // written so that NaN is rejected as well
    if !(MIN_BRIGHTNESS..=MAX_BRIGHTNESS).contains(&brightness) {
        return Err(Error::InvalidBrightness(brightness));
    }
    Ok(())
}

/// Encode a fractional brightness into the pixel frame's brightness bits.
///
/// The result is masked to six bits rather than clamped to five, so inputs
/// above 1.0 produce values up to 63. Callers going through the strip API
/// never see those since the input is validated first.
pub fn encode_brightness(brightness: f64) -> u8 {
    ((31.0 * brightness).floor() as i64 & 0b11_1111) as u8
}

/// Validate then encode an optional brightness.
pub(crate) fn checked_brightness(brightness: Option<f64>) -> Result<Option<u8>> {
    brightness
        .map(|b| validate_brightness(b).map(|_| encode_brightness(b)))
        .transpose()
}

/// Fixed size pixel store. Owns no I/O.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    pixels: [Pixel; PIXEL_COUNT],
}

impl PixelBuffer {
    pub fn new(brightness: u8) -> Self {
        Self {
            pixels: [Pixel::off(brightness); PIXEL_COUNT],
        }
    }

    pub fn get(&self, index: usize) -> Option<&Pixel> {
        self.pixels.get(index)
    }

    pub fn as_slice(&self) -> &[Pixel] {
        &self.pixels
    }

    pub fn set_pixel(&mut self, index: usize, color: Rgb, brightness: Option<u8>) -> Result<()> {
        let pixel = self
            .pixels
            .get_mut(index)
            .ok_or(Error::IndexOutOfRange(index))?;
        pixel.paint(color, brightness);
        Ok(())
    }

    pub fn set_channel(&mut self, channel: usize, color: Rgb, brightness: Option<u8>) -> Result<()> {
        let range = channel_range(channel)?;
        self.pixels[range]
            .iter_mut()
            .for_each(|p| p.paint(color, brightness));
        Ok(())
    }

    pub fn set_all(&mut self, color: Rgb, brightness: Option<u8>) {
        self.pixels
            .iter_mut()
            .for_each(|p| p.paint(color, brightness));
    }
}

impl Default for PixelBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BRIGHTNESS)
    }
}

/// Pixel indices covered by `channel`.
pub fn channel_range(channel: usize) -> Result<std::ops::Range<usize>> {
    if channel >= CHANNEL_COUNT {
        return Err(Error::InvalidChannel(channel));
    }
    let start = channel * PIXELS_PER_CHANNEL;
    Ok(start..start + PIXELS_PER_CHANNEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_brightness_bounds() {
        assert_eq!(encode_brightness(0.1), 3);
        assert_eq!(encode_brightness(0.5), 15);
        assert_eq!(encode_brightness(1.0), 31);
    }

    #[test]
    fn brightness_mask_is_not_a_clamp() {
        // 31 * 1.5 = 46.5
        assert_eq!(encode_brightness(1.5), 46);
        // 31 * 2.1 = 65.1, 65 & 63
        assert_eq!(encode_brightness(2.1), 1);
    }

    #[test]
    fn rejects_out_of_range_brightness() {
        for b in [0.0, 0.09, 1.01, -1.0, f64::NAN] {
            assert!(matches!(
                validate_brightness(b),
                Err(Error::InvalidBrightness(_))
            ));
        }
        assert!(validate_brightness(0.1).is_ok());
        assert!(validate_brightness(1.0).is_ok());
    }

    #[test]
    fn channel_ranges() {
        assert_eq!(channel_range(0).unwrap(), 0..8);
        assert_eq!(channel_range(1).unwrap(), 8..16);
        assert!(matches!(channel_range(2), Err(Error::InvalidChannel(2))));
    }

    #[test]
    fn set_pixel_touches_one_pixel() {
        let mut buf = PixelBuffer::default();
        buf.set_pixel(3, Rgb::new(1, 2, 3), Some(9)).unwrap();
        for (i, p) in buf.as_slice().iter().enumerate() {
            if i == 3 {
                assert_eq!(*p, Pixel { red: 1, green: 2, blue: 3, brightness: 9 });
            } else {
                assert_eq!(*p, Pixel::off(DEFAULT_BRIGHTNESS));
            }
        }
    }

    #[test]
    fn omitted_brightness_is_kept() {
        let mut buf = PixelBuffer::new(20);
        buf.set_all(Rgb::new(5, 5, 5), None);
        assert!(buf.as_slice().iter().all(|p| p.brightness == 20));
    }

    #[test]
    fn out_of_range_index_leaves_buffer_alone() {
        let mut buf = PixelBuffer::default();
        let before = buf.clone();
        assert!(matches!(
            buf.set_pixel(16, Rgb::new(1, 1, 1), None),
            Err(Error::IndexOutOfRange(16))
        ));
        assert_eq!(buf, before);
    }
}
