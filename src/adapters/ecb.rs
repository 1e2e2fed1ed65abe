//! European Central Bank historical reference rates.
//!
//! The feed is one CSV with a `Date` column and one column per currency,
//! each holding units of that currency per EUR (`N/A` when unpublished).
//! Any pair whose legs are EUR or an ECB column is derived as
//! `quote_per_eur / base_per_eur`.

use crate::domain::bar::parse_date;
use crate::domain::error::EtlError;
use crate::domain::fx::{FxPair, RawFxRow};
use crate::domain::retry::{Outcome, RetryPolicy, fetch_with_retry};
use crate::ports::http_port::{HttpPort, HttpRequest};
use crate::ports::source_port::FxSource;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::info;

pub const SOURCE: &str = "ecb";

pub struct Ecb {
    http: Arc<dyn HttpPort>,
    policy: RetryPolicy,
    url: String,
}

impl Ecb {
    pub fn new(http: Arc<dyn HttpPort>, policy: RetryPolicy, url: &str) -> Self {
        Self {
            http,
            policy,
            url: url.to_string(),
        }
    }
}

impl FxSource for Ecb {
    fn name(&self) -> &str {
        SOURCE
    }

    fn fetch_rates(&self, pairs: &[FxPair], start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
        let request = HttpRequest::get(&self.url);
        let body = fetch_with_retry(self.http.as_ref(), &self.policy, SOURCE, &request, |resp| {
            Outcome::Ready(resp.body.clone())
        })?;
        let rows = derive_pairs(&body, pairs, start_date)?;
        info!(source = SOURCE, pairs = pairs.len(), rows = rows.len(), "fetched reference rates");
        Ok(rows)
    }
}

/// Column index of a currency leg, or `None` for EUR itself.
enum Leg {
    Eur,
    Column(usize),
}

impl Leg {
    fn per_eur(&self, record: &csv::StringRecord) -> Option<f64> {
        match self {
            Leg::Eur => Some(1.0),
            Leg::Column(i) => record
                .get(*i)
                .map(str::trim)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v > 0.0),
        }
    }
}

fn derive_pairs(body: &str, pairs: &[FxPair], start_date: NaiveDate) -> Result<Vec<RawFxRow>, EtlError> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| EtlError::schema(SOURCE, format!("CSV header error: {e}")))?
        .iter()
        .map(|h| h.trim().to_uppercase())
        .collect();
    let date_idx = headers
        .iter()
        .position(|h| h == "DATE")
        .ok_or_else(|| EtlError::schema(SOURCE, "no Date column"))?;

    let leg = |code: &str| -> Result<Leg, EtlError> {
        if code == "EUR" {
            return Ok(Leg::Eur);
        }
        headers
            .iter()
            .position(|h| h == code)
            .map(Leg::Column)
            .ok_or_else(|| EtlError::schema(SOURCE, format!("no {code} column in reference rates")))
    };
    let legs = pairs
        .iter()
        .map(|p| Ok((*p, leg(p.base())?, leg(p.quote())?)))
        .collect::<Result<Vec<_>, EtlError>>()?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| EtlError::schema(SOURCE, format!("CSV parse error: {e}")))?;
        let Some(date_str) = record.get(date_idx).map(str::trim) else {
            continue;
        };
        if !parse_date(date_str).is_some_and(|d| d >= start_date) {
            continue;
        }
        for (pair, base, quote) in &legs {
            let rate = match (base.per_eur(&record), quote.per_eur(&record)) {
                (Some(b), Some(q)) => Some((q / b).to_string()),
                _ => None,
            };
            rows.push(RawFxRow {
                pair: Some(pair.to_string()),
                date: Some(date_str.to_string()),
                rate,
                source: SOURCE.to_string(),
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::stub_http::StubHttp;
    use approx::assert_relative_eq;

    const HIST: &str = "Date,USD,JPY,GBP,\n\
                        2024-01-03,1.0919,155.22,0.86075,\n\
                        2024-01-02,1.0956,155.36,0.86518,\n\
                        2023-12-29,1.1050,156.33,0.86905,\n\
                        2023-12-26,N/A,N/A,N/A,\n";

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn pairs(list: &[&str]) -> Vec<FxPair> {
        list.iter().map(|p| FxPair::parse(p).unwrap()).collect()
    }

    fn rate_for(rows: &[RawFxRow], pair: &str, date: &str) -> f64 {
        rows.iter()
            .find(|r| r.pair.as_deref() == Some(pair) && r.date.as_deref() == Some(date))
            .and_then(|r| r.rate.as_deref())
            .unwrap()
            .parse()
            .unwrap()
    }

    #[test]
    fn derives_cross_rates() {
        let rows = derive_pairs(HIST, &pairs(&["USDGBP", "EURUSD", "EURGBP"]), start()).unwrap();
        assert_eq!(rows.len(), 6);
        assert_relative_eq!(rate_for(&rows, "USDGBP", "2024-01-02"), 0.86518 / 1.0956, epsilon = 1e-12);
        assert_relative_eq!(rate_for(&rows, "EURUSD", "2024-01-03"), 1.0919, epsilon = 1e-12);
        assert_relative_eq!(rate_for(&rows, "EURGBP", "2024-01-03"), 0.86075, epsilon = 1e-12);
    }

    #[test]
    fn inverse_pair_against_eur() {
        let rows = derive_pairs(HIST, &pairs(&["USD/EUR"]), start()).unwrap();
        assert_relative_eq!(rate_for(&rows, "USDEUR", "2024-01-02"), 1.0 / 1.0956, epsilon = 1e-12);
    }

    #[test]
    fn missing_values_left_for_the_cleaner() {
        let start = NaiveDate::from_ymd_opt(2023, 12, 1).unwrap();
        let rows = derive_pairs(HIST, &pairs(&["USDGBP"]), start).unwrap();
        let dec26 = rows.iter().find(|r| r.date.as_deref() == Some("2023-12-26")).unwrap();
        assert_eq!(dec26.rate, None);
    }

    #[test]
    fn unknown_currency_is_schema_mismatch() {
        let err = derive_pairs(HIST, &pairs(&["USDCHF"]), start()).unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("CHF"));
    }

    #[test]
    fn fetch_goes_through_transport() {
        let http = Arc::new(StubHttp::new().script("eurofxref", vec![(500, ""), (200, HIST)]));
        let ecb = Ecb::new(http.clone(), RetryPolicy::immediate(5), "http://ecb.test/eurofxref-hist.csv");
        let rows = ecb.fetch_rates(&pairs(&["USDGBP"]), start()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(http.calls(), 2);
    }
}
