//! Row cleaning for equity bars and FX rates.
//!
//! Pure functions, no I/O. For each dataset, in order:
//! 1. drop rows missing a key component or the required price,
//! 2. coerce numeric fields (unparsable or non-finite becomes missing, and the
//!    row is dropped if that field is required),
//! 3. fill a missing volume with zero,
//! 4. deduplicate on the natural key keeping the last occurrence,
//! 5. normalize key casing (`aapl` -> `AAPL`, `usd/gbp` -> `USDGBP`).
//!
//! `clean(clean(x)) == clean(x)` for both datasets.

use super::bar::{EquityBar, RawEquityRow, parse_date};
use super::fx::{FxPair, FxRate, RawFxRow};
use std::collections::HashMap;
use std::hash::Hash;

pub fn clean_equities(rows: &[RawEquityRow]) -> Vec<EquityBar> {
    let typed = rows.iter().filter_map(|row| {
        let symbol = non_blank(row.symbol.as_deref())?.to_uppercase();
        let date = parse_date(non_blank(row.date.as_deref())?)?;
        let close = parse_number(non_blank(row.close.as_deref())?)?;
        Some(EquityBar {
            symbol,
            date,
            open: row.open.as_deref().and_then(parse_number),
            high: row.high.as_deref().and_then(parse_number),
            low: row.low.as_deref().and_then(parse_number),
            close,
            volume: row.volume.as_deref().and_then(parse_volume).unwrap_or(0),
            source: row.source.trim().to_string(),
        })
    });

    dedup_keep_last(typed, |bar| (bar.symbol.clone(), bar.date))
}

pub fn clean_fx(rows: &[RawFxRow]) -> Vec<FxRate> {
    let typed = rows.iter().filter_map(|row| {
        let pair = FxPair::parse(non_blank(row.pair.as_deref())?)?;
        let date = parse_date(non_blank(row.date.as_deref())?)?;
        let rate = parse_number(non_blank(row.rate.as_deref())?)?;
        Some(FxRate {
            pair,
            date,
            rate,
            source: row.source.trim().to_string(),
        })
    });

    dedup_keep_last(typed, |rate| (rate.pair, rate.date))
}

/// Keep the last occurrence of each key. Survivors stay in the order of their
/// final appearance.
fn dedup_keep_last<T, K, I, F>(items: I, key: F) -> Vec<T>
where
    I: Iterator<Item = T>,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut slots: Vec<Option<T>> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();

    for item in items {
        if let Some(previous) = index.insert(key(&item), slots.len()) {
            slots[previous] = None;
        }
        slots.push(Some(item));
    }

    slots.into_iter().flatten().collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_volume(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| parse_number(trimmed).map(|v| v.round() as i64))
}
