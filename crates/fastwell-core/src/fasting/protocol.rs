use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A fasting protocol. Each label maps to a fixed target duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FastingLabel {
    #[serde(rename = "12:12")]
    TwelveTwelve,
    #[serde(rename = "14:10")]
    FourteenTen,
    #[serde(rename = "16:8")]
    SixteenEight,
    #[serde(rename = "18:6")]
    EighteenSix,
    #[serde(rename = "20:4")]
    TwentyFour,
    #[serde(rename = "OMAD")]
    Omad,
}

impl FastingLabel {
    pub const ALL: [FastingLabel; 6] = [
        FastingLabel::TwelveTwelve,
        FastingLabel::FourteenTen,
        FastingLabel::SixteenEight,
        FastingLabel::EighteenSix,
        FastingLabel::TwentyFour,
        FastingLabel::Omad,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FastingLabel::TwelveTwelve => "12:12",
            FastingLabel::FourteenTen => "14:10",
            FastingLabel::SixteenEight => "16:8",
            FastingLabel::EighteenSix => "18:6",
            FastingLabel::TwentyFour => "20:4",
            FastingLabel::Omad => "OMAD",
        }
    }

    /// Lenient lookup used when reading persisted state.
    ///
    /// Returns `None` for anything that is not one of the known labels,
    /// including values written by older builds.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(raw))
    }

    pub fn duration_hours(&self) -> u64 {
        match self {
            FastingLabel::TwelveTwelve => 12,
            FastingLabel::FourteenTen => 14,
            FastingLabel::SixteenEight => 16,
            FastingLabel::EighteenSix => 18,
            FastingLabel::TwentyFour => 20,
            FastingLabel::Omad => 23,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_hours() * 60 * 60
    }

    pub fn duration(&self) -> chrono::Duration {
        chrono::Duration::hours(self.duration_hours() as i64)
    }
}

impl fmt::Display for FastingLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FastingLabel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ValidationError::UnknownLabel(s.to_string()))
    }
}
