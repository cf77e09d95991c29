//! Frame conversion for candle tables.
//!
//! Duration frames bucket rows into epoch-aligned intervals labelled by the
//! interval start. Tick frames group rows into fixed-size position groups
//! labelled by the first row's stamp; a trailing partial group is kept.
//!
//! Aggregation per group: first open, highest high, lowest low, last close,
//! summed volume, highest spread.

use mtlink_core::types::{Candle, Timeframe};

use crate::store::CandleTable;

/// Convert a table to a new frame. Rows come out stamp-ascending because the
/// input is and group labels never decrease.
pub fn resample_table(frame: Timeframe, table: &CandleTable) -> CandleTable {
    let rows = table.rows();
    if rows.is_empty() {
        return CandleTable::new();
    }
    let grouped = match frame.duration_us() {
        Some(width_us) => bucket_by_time(rows, width_us),
        None => bucket_by_count(rows, frame.count as usize),
    };
    CandleTable::from_rows(grouped)
}

fn merge(agg: &mut Candle, row: &Candle) {
    agg.high = agg.high.max(row.high);
    agg.low = agg.low.min(row.low);
    agg.close = row.close;
    agg.volume += row.volume;
    agg.spread = agg.spread.max(row.spread);
}

fn bucket_by_time(rows: &[Candle], width_us: i64) -> Vec<Candle> {
    let mut out = Vec::new();
    let mut current: Option<Candle> = None;
    for row in rows {
        let bucket = row.stamp_us.div_euclid(width_us) * width_us;
        match &mut current {
            Some(agg) if agg.stamp_us == bucket => merge(agg, row),
            _ => {
                if let Some(agg) = current.take() {
                    out.push(agg);
                }
                let mut agg = *row;
                agg.stamp_us = bucket;
                current = Some(agg);
            }
        }
    }
    if let Some(agg) = current {
        out.push(agg);
    }
    out
}

fn bucket_by_count(rows: &[Candle], group: usize) -> Vec<Candle> {
    rows.chunks(group.max(1))
        .filter_map(|chunk| {
            let (first, rest) = chunk.split_first()?;
            let mut agg = *first;
            for row in rest {
                merge(&mut agg, row);
            }
            Some(agg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(stamp_secs: i64, o: f64, h: f64, l: f64, c: f64, v: f64, s: f64) -> Candle {
        Candle {
            stamp_us: stamp_secs * 1_000_000,
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
            spread: s,
        }
    }

    fn table(rows: Vec<Candle>) -> CandleTable {
        CandleTable::from_rows(rows)
    }

    fn frame(label: &str) -> Timeframe {
        Timeframe::parse(label).unwrap()
    }

    #[test]
    fn aggregation_per_bucket() {
        let input = table(vec![
            row(0, 1.0, 5.0, 0.0, 3.0, 10.0, 2.0),
            row(30, 2.0, 4.0, 1.0, 2.0, 7.0, 6.0),
        ]);
        let out = resample_table(frame("M1"), &input);
        assert_eq!(out.len(), 1);
        let agg = out.rows()[0];
        assert_eq!(agg.stamp_us, 0);
        assert_eq!(agg.open, 1.0);
        assert_eq!(agg.high, 5.0);
        assert_eq!(agg.low, 0.0);
        assert_eq!(agg.close, 2.0);
        assert_eq!(agg.volume, 17.0);
        assert_eq!(agg.spread, 6.0);
    }

    #[test]
    fn buckets_are_epoch_aligned() {
        let input = table(vec![
            row(59, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0),
            row(60, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0),
            row(90, 3.0, 3.0, 3.0, 3.0, 1.0, 1.0),
        ]);
        let out = resample_table(frame("M1"), &input);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0].stamp_us, 0);
        assert_eq!(out.rows()[1].stamp_us, 60_000_000);
        assert_eq!(out.rows()[1].close, 3.0);
    }

    #[test]
    fn tick_groups_keep_the_trailing_partial() {
        let input = table(vec![
            row(1, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0),
            row(2, 2.0, 2.0, 2.0, 2.0, 1.0, 1.0),
            row(3, 3.0, 3.0, 3.0, 3.0, 1.0, 1.0),
            row(4, 4.0, 4.0, 4.0, 4.0, 1.0, 1.0),
            row(5, 5.0, 5.0, 5.0, 5.0, 1.0, 1.0),
        ]);
        let out = resample_table(frame("T2"), &input);
        assert_eq!(out.len(), 3);
        // Groups labelled by their first row's stamp.
        assert_eq!(out.rows()[0].stamp_us, 1_000_000);
        assert_eq!(out.rows()[1].stamp_us, 3_000_000);
        assert_eq!(out.rows()[2].stamp_us, 5_000_000);
        assert_eq!(out.rows()[0].close, 2.0);
        assert_eq!(out.rows()[2].volume, 1.0);
    }

    #[test]
    fn aligned_input_is_unchanged() {
        let input = table(vec![
            row(0, 1.0, 2.0, 0.5, 1.5, 10.0, 3.0),
            row(300, 1.5, 2.5, 1.0, 2.0, 12.0, 2.0),
            row(600, 2.0, 3.0, 1.5, 2.5, 8.0, 4.0),
        ]);
        let out = resample_table(frame("M5"), &input);
        assert_eq!(out.rows(), input.rows());
    }

    #[test]
    fn empty_input_stays_empty() {
        let out = resample_table(frame("H1"), &table(Vec::new()));
        assert!(out.is_empty());
    }
}
