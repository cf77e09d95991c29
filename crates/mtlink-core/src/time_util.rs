//! Timestamp conversion utilities.
//!
//! The wire protocol and history files carry Unix timestamps in (possibly
//! fractional) seconds; everything in process uses integer microseconds.

/// Microseconds per second.
pub const US_PER_SEC: i64 = 1_000_000;

/// Convert fractional Unix seconds to microseconds since epoch.
///
/// Rounds to the nearest microsecond. Non-finite inputs map to 0.
#[inline]
pub fn secs_to_us(secs: f64) -> i64 {
    if !secs.is_finite() {
        return 0;
    }
    (secs * US_PER_SEC as f64).round() as i64
}

/// Convert microseconds since epoch to fractional Unix seconds.
#[inline]
pub fn us_to_secs(us: i64) -> f64 {
    us as f64 / US_PER_SEC as f64
}

/// Convert microseconds since epoch to whole Unix seconds, rounding to the
/// nearest second. Used for timestamps embedded in artifact file names.
#[inline]
pub fn us_to_whole_secs(us: i64) -> i64 {
    let (q, r) = (us.div_euclid(US_PER_SEC), us.rem_euclid(US_PER_SEC));
    if r * 2 >= US_PER_SEC { q + 1 } else { q }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secs_round_trip() {
        assert_eq!(secs_to_us(1.5), 1_500_000);
        assert_eq!(secs_to_us(1_700_000_000.000001), 1_700_000_000_000_001);
        assert_eq!(us_to_secs(2_500_000), 2.5);
    }

    #[test]
    fn whole_secs_rounds() {
        assert_eq!(us_to_whole_secs(1_499_999), 1);
        assert_eq!(us_to_whole_secs(1_500_000), 2);
        assert_eq!(us_to_whole_secs(-500_000), 0);
        assert_eq!(us_to_whole_secs(-500_001), -1);
    }

    #[test]
    fn non_finite_secs_clamp_to_zero() {
        assert_eq!(secs_to_us(f64::NAN), 0);
        assert_eq!(secs_to_us(f64::INFINITY), 0);
    }
}
