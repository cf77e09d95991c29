//! Aggregated market data rows.

/// Number of value fields per row (open, high, low, close, volume, spread).
pub const FIELD_COUNT: usize = 6;

/// One row of a symbol table.
///
/// Rows are keyed by `stamp_us`, microseconds since Unix epoch. For a tick
/// stream each row is a single observation; for a duration frame each row is
/// the aggregate of its bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub stamp_us: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub spread: f64,
}

impl Candle {
    /// Build a row from a stamp and the six value fields in column order.
    pub fn from_fields(stamp_us: i64, fields: &[f64]) -> Option<Self> {
        match fields {
            [open, high, low, close, volume, spread] => Some(Self {
                stamp_us,
                open: *open,
                high: *high,
                low: *low,
                close: *close,
                volume: *volume,
                spread: *spread,
            }),
            _ => None,
        }
    }

    /// The six value fields in column order.
    pub fn fields(&self) -> [f64; FIELD_COUNT] {
        [
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
            self.spread,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fields_requires_exact_arity() {
        assert!(Candle::from_fields(0, &[1.0, 2.0, 0.5, 1.5, 10.0, 3.0]).is_some());
        assert!(Candle::from_fields(0, &[1.0, 2.0, 0.5]).is_none());
        assert!(Candle::from_fields(0, &[1.0; 7]).is_none());
    }

    #[test]
    fn fields_preserve_column_order() {
        let candle = Candle::from_fields(7, &[1.0, 2.0, 0.5, 1.5, 10.0, 3.0]).unwrap();
        assert_eq!(candle.high, 2.0);
        assert_eq!(candle.fields(), [1.0, 2.0, 0.5, 1.5, 10.0, 3.0]);
    }
}
