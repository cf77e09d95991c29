//! Timeframe labels and their canonical encoding.
//!
//! A timeframe is written as a unit letter plus an integer count, e.g. `T50`
//! (50 ticks), `Z500` (500 milliseconds), `S30`, `M5`, `H4`, `D1`, `W1`. The
//! monthly frame is the traditional `MN` label (a bare `MN` means one month).
//!
//! Every frame maps to a canonical value in seconds, rounded to one decimal
//! place. Tick frames encode as the *negative* tick count so that any tick
//! frame sorts finer than any duration frame. The canonical value is what
//! goes on the wire and into artifact file names.

use std::fmt;

use crate::error::LinkError;

/// Frames the terminal can serve history for.
pub const DOWNLOAD_FRAMES: [&str; 9] =
    ["M1", "M5", "M15", "M30", "H1", "H4", "D1", "W1", "MN"];

/// Finest representable duration frame, in seconds.
const MIN_RESOLUTION_SECS: f64 = 0.1;

// ---------------------------------------------------------------------------
// TimeUnit
// ---------------------------------------------------------------------------

/// Unit letter of a timeframe label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Ticks,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

impl TimeUnit {
    /// Seconds per unit. Ticks have no duration and report 0.
    fn secs_per_unit(self) -> f64 {
        match self {
            Self::Ticks => 0.0,
            Self::Milliseconds => 1e-3,
            Self::Seconds => 1.0,
            Self::Minutes => 60.0,
            Self::Hours => 3_600.0,
            Self::Days => 86_400.0,
            Self::Weeks => 604_800.0,
            Self::Months => 2_592_000.0,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ticks => "T",
            Self::Milliseconds => "Z",
            Self::Seconds => "S",
            Self::Minutes => "M",
            Self::Hours => "H",
            Self::Days => "D",
            Self::Weeks => "W",
            Self::Months => "MN",
        }
    }
}

// ---------------------------------------------------------------------------
// Timeframe
// ---------------------------------------------------------------------------

/// A parsed timeframe: unit plus count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    pub unit: TimeUnit,
    pub count: u32,
}

impl Timeframe {
    /// Parse a label such as `"M5"`, `"T100"`, or `"MN"`.
    pub fn parse(label: &str) -> Result<Self, LinkError> {
        let (unit, digits) = if let Some(rest) = label.strip_prefix("MN") {
            (TimeUnit::Months, rest)
        } else {
            let unit = match label.chars().next() {
                Some('T') => TimeUnit::Ticks,
                Some('Z') => TimeUnit::Milliseconds,
                Some('S') => TimeUnit::Seconds,
                Some('M') => TimeUnit::Minutes,
                Some('H') => TimeUnit::Hours,
                Some('D') => TimeUnit::Days,
                Some('W') => TimeUnit::Weeks,
                _ => {
                    return Err(LinkError::Validation(format!(
                        "unknown timeframe unit in \"{label}\""
                    )));
                }
            };
            (unit, &label[1..])
        };

        // A bare "MN" is one month; every other unit requires an explicit count.
        let count = if digits.is_empty() && unit == TimeUnit::Months {
            1
        } else {
            digits.parse::<u32>().map_err(|_| {
                LinkError::Validation(format!("bad timeframe count in \"{label}\""))
            })?
        };
        if count == 0 {
            return Err(LinkError::Validation(format!(
                "timeframe count must be positive in \"{label}\""
            )));
        }

        let frame = Self { unit, count };
        if unit != TimeUnit::Ticks && frame.canonical_secs() < MIN_RESOLUTION_SECS {
            return Err(LinkError::Validation(format!(
                "timeframe \"{label}\" is below the {MIN_RESOLUTION_SECS}s resolution floor"
            )));
        }
        Ok(frame)
    }

    /// Canonical value in seconds, rounded to one decimal place. Negative for
    /// tick frames.
    pub fn canonical_secs(&self) -> f64 {
        let raw = if self.unit == TimeUnit::Ticks {
            -(self.count as f64)
        } else {
            self.count as f64 * self.unit.secs_per_unit()
        };
        (raw * 10.0).round() / 10.0
    }

    /// Whether this is a tick-count frame rather than a duration frame.
    pub fn is_ticks(&self) -> bool {
        self.unit == TimeUnit::Ticks
    }

    /// Bucket width in microseconds for duration frames, `None` for ticks.
    pub fn duration_us(&self) -> Option<i64> {
        if self.is_ticks() {
            None
        } else {
            Some((self.canonical_secs() * 1e6).round() as i64)
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == TimeUnit::Months && self.count == 1 {
            write!(f, "MN")
        } else {
            write!(f, "{}{}", self.unit.label(), self.count)
        }
    }
}

/// Whether a label names one of the frames the terminal serves history for.
pub fn download_supported(label: &str) -> bool {
    DOWNLOAD_FRAMES.contains(&label)
}

/// Render a numeric wire field or file name component: whole values lose the
/// fraction, fractional values keep it.
pub fn format_field(value: f64) -> String {
    if value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_all_units() {
        let cases = [
            ("T100", -100.0),
            ("Z500", 0.5),
            ("S30", 30.0),
            ("M5", 300.0),
            ("H4", 14_400.0),
            ("D1", 86_400.0),
            ("W1", 604_800.0),
            ("MN", 2_592_000.0),
            ("MN2", 5_184_000.0),
        ];
        for (label, secs) in cases {
            let frame = Timeframe::parse(label).unwrap();
            assert_eq!(frame.canonical_secs(), secs, "{label}");
        }
    }

    #[test]
    fn display_round_trips() {
        for label in ["T100", "Z500", "S30", "M5", "H4", "D1", "W1", "MN", "MN2"] {
            let frame = Timeframe::parse(label).unwrap();
            assert_eq!(frame.to_string(), label);
        }
    }

    #[test]
    fn rejects_bad_labels() {
        for label in ["", "X5", "M", "M0", "Mfive", "5M", "Z49"] {
            assert!(Timeframe::parse(label).is_err(), "{label:?} should fail");
        }
    }

    #[test]
    fn millisecond_frames_round_to_tenths() {
        assert_eq!(Timeframe::parse("Z250").unwrap().canonical_secs(), 0.3);
        assert_eq!(Timeframe::parse("Z150").unwrap().canonical_secs(), 0.2);
        assert_eq!(
            Timeframe::parse("Z500").unwrap().duration_us(),
            Some(500_000)
        );
    }

    #[test]
    fn tick_frames_have_no_duration() {
        let frame = Timeframe::parse("T50").unwrap();
        assert!(frame.is_ticks());
        assert_eq!(frame.duration_us(), None);
    }

    #[test]
    fn download_frame_set() {
        assert!(download_supported("M15"));
        assert!(download_supported("MN"));
        assert!(!download_supported("M2"));
        assert!(!download_supported("T100"));
    }

    #[test]
    fn field_formatting() {
        assert_eq!(format_field(300.0), "300");
        assert_eq!(format_field(0.5), "0.5");
        assert_eq!(format_field(-50.0), "-50");
        assert_eq!(format_field(1.5), "1.5");
    }
}
