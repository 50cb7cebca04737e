//! Physical pin assignments of the board.
//!
//! Pins are numbered by their position on the 40 pin header, not by BCM
//! GPIO line. [`bcm_line`] translates between the two.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use thiserror::Error;

pub const DATA_PIN: u8 = 16;
pub const CLOCK_PIN: u8 = 18;

pub const FAST_FORWARD_PIN: u8 = 29;
pub const PLAY_PAUSE_PIN: u8 = 31;
pub const REWIND_PIN: u8 = 33;
pub const VOL_UP_PIN: u8 = 36;
pub const VOL_DOWN_PIN: u8 = 37;
pub const POWER_PIN: u8 = 32;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ButtonName {
    FastForward,
    PlayPause,
    Rewind,
    VolUp,
    VolDown,
    Power,
}

impl ButtonName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ButtonName::FastForward => "FAST_FORWARD",
            ButtonName::PlayPause => "PLAY_PAUSE",
            ButtonName::Rewind => "REWIND",
            ButtonName::VolUp => "VOL_UP",
            ButtonName::VolDown => "VOL_DOWN",
            ButtonName::Power => "POWER",
        }
    }

    pub fn pin(&self) -> u8 {
        match self {
            ButtonName::FastForward => FAST_FORWARD_PIN,
            ButtonName::PlayPause => PLAY_PAUSE_PIN,
            ButtonName::Rewind => REWIND_PIN,
            ButtonName::VolUp => VOL_UP_PIN,
            ButtonName::VolDown => VOL_DOWN_PIN,
            ButtonName::Power => POWER_PIN,
        }
    }
}

impl fmt::Display for ButtonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown button {0:?}")]
pub struct UnknownButton(pub String);

impl FromStr for ButtonName {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BUTTONS
            .iter()
            .map(|spec| spec.name)
            .find(|name| name.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownButton(s.to_owned()))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ButtonSpec {
    pub pin: u8,
    pub name: ButtonName,
}

const fn spec(name: ButtonName, pin: u8) -> ButtonSpec {
    ButtonSpec { pin, name }
}

static BUTTONS: [ButtonSpec; 6] = [
    spec(ButtonName::FastForward, FAST_FORWARD_PIN),
    spec(ButtonName::PlayPause, PLAY_PAUSE_PIN),
    spec(ButtonName::Rewind, REWIND_PIN),
    spec(ButtonName::VolUp, VOL_UP_PIN),
    spec(ButtonName::VolDown, VOL_DOWN_PIN),
    spec(ButtonName::Power, POWER_PIN),
];

/// The six buttons, in board order.
pub fn button_specs() -> &'static [ButtonSpec] {
    &BUTTONS
}

/// Data, clock and every button pin.
pub fn all_pins() -> impl Iterator<Item = u8> {
    [DATA_PIN, CLOCK_PIN]
        .into_iter()
        .chain(BUTTONS.iter().map(|b| b.pin))
}

lazy_static! {
    // physical header position -> BCM line
    static ref HEADER: HashMap<u8, u8> = [
        (3, 2), (5, 3), (7, 4), (8, 14), (10, 15), (11, 17), (12, 18), (13, 27),
        (15, 22), (16, 23), (18, 24), (19, 10), (21, 9), (22, 25), (23, 11),
        (24, 8), (26, 7), (27, 0), (28, 1), (29, 5), (31, 6), (32, 12),
        (33, 13), (35, 19), (36, 16), (37, 26), (38, 20), (40, 21),
    ]
    .iter()
    .copied()
    .collect();
}

/// BCM GPIO line wired to a physical header pin. `None` for power, ground
/// and out of range positions.
pub fn bcm_line(physical: u8) -> Option<u8> {
    HEADER.get(&physical).copied()
}
