use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the strip controller, the button monitor and GPIO backends.
#[derive(Debug, Error)]
pub enum Error {
    #[error("brightness must be between 0.1 and 1.0, provided was {0}")]
    InvalidBrightness(f64),

    #[error("{0} is not a valid pixel index")]
    IndexOutOfRange(usize),

    #[error("provided channel ({0}) was invalid, please provide either 0 or 1")]
    InvalidChannel(usize),

    #[error("pin {0} is already claimed")]
    PinUnavailable(u8),

    /// The physical pin has no GPIO line behind it on the 40 pin header.
    #[error("physical pin {0} is not a gpio pin")]
    UnknownPin(u8),

    #[error("gpio failure on pin {pin}")]
    Gpio {
        pin: u8,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn gpio<E>(pin: u8, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Gpio {
            pin,
            source: Box::new(source),
        }
    }
}
