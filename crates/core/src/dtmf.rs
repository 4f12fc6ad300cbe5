//! DTMF keypad entries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AudioError;

/// A key on the telephone keypad, including the extended A-D column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeypadEntry {
    #[serde(rename = "0")]
    Zero,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    #[serde(rename = "6")]
    Six,
    #[serde(rename = "7")]
    Seven,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "9")]
    Nine,
    #[serde(rename = "A")]
    A,
    #[serde(rename = "B")]
    B,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "*")]
    Star,
    #[serde(rename = "#")]
    Pound,
}

impl KeypadEntry {
    pub fn from_char(c: char) -> Option<Self> {
        let entry = match c {
            '0' => Self::Zero,
            '1' => Self::One,
            '2' => Self::Two,
            '3' => Self::Three,
            '4' => Self::Four,
            '5' => Self::Five,
            '6' => Self::Six,
            '7' => Self::Seven,
            '8' => Self::Eight,
            '9' => Self::Nine,
            'A' => Self::A,
            'B' => Self::B,
            'C' => Self::C,
            'D' => Self::D,
            '*' => Self::Star,
            '#' => Self::Pound,
            _ => return None,
        };
        Some(entry)
    }

    pub fn as_char(&self) -> char {
        match self {
            Self::Zero => '0',
            Self::One => '1',
            Self::Two => '2',
            Self::Three => '3',
            Self::Four => '4',
            Self::Five => '5',
            Self::Six => '6',
            Self::Seven => '7',
            Self::Eight => '8',
            Self::Nine => '9',
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::D => 'D',
            Self::Star => '*',
            Self::Pound => '#',
        }
    }
}

impl FromStr for KeypadEntry {
    type Err = AudioError;

    /// Parse a single keypad symbol; anything longer than one char is invalid
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                Self::from_char(c).ok_or_else(|| AudioError::InvalidKeypadEntry(s.to_string()))
            },
            _ => Err(AudioError::InvalidKeypadEntry(s.to_string())),
        }
    }
}

impl fmt::Display for KeypadEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}
