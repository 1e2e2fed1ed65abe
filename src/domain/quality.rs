//! Post-load data-quality gate.
//!
//! Each [`QualityCheck`] is a read-only `COUNT(*)` query paired with an
//! expectation. Every evaluated check is appended to `DQ_AUDIT_LOG`. When any
//! check fails the notifier is called exactly once for the run and the gate
//! returns [`EtlError::DataQualityFailure`], so downstream transforms never
//! see unvalidated data.

use super::error::EtlError;
use super::fx::FxPair;
use crate::ports::notifier_port::NotifierPort;
use crate::ports::warehouse_port::{SqlValue, WarehousePort};
use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// The count must be zero (e.g. offending rows).
    Zero,
    /// The count must be positive (e.g. today's partition).
    NonZero,
}

impl Expectation {
    fn holds(self, count: i64) -> bool {
        match self {
            Expectation::Zero => count == 0,
            Expectation::NonZero => count > 0,
        }
    }

    fn describe(self, count: i64) -> String {
        match self {
            Expectation::Zero => format!("expected 0 rows, found {count}"),
            Expectation::NonZero => format!("expected rows, found {count}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    pub name: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
    pub expectation: Expectation,
}

impl QualityCheck {
    pub fn new(name: &str, sql: &str, params: Vec<SqlValue>, expectation: Expectation) -> Self {
        Self {
            name: name.to_string(),
            sql: sql.to_string(),
            params,
            expectation,
        }
    }
}

/// The standard checks run after every load.
pub fn default_checks(join_pair: FxPair, run_date: NaiveDate, require_today: bool) -> Vec<QualityCheck> {
    let mut checks = vec![
        QualityCheck::new(
            "fx_join_gaps",
            "SELECT COUNT(*) FROM EQUITY_DAILY e \
             LEFT JOIN FX_DAILY fx ON e.DATE = fx.DATE AND fx.PAIR = $1 \
             WHERE fx.RATE IS NULL",
            vec![SqlValue::Text(join_pair.to_string())],
            Expectation::Zero,
        ),
        QualityCheck::new(
            "non_positive_close",
            "SELECT COUNT(*) FROM EQUITY_DAILY WHERE CLOSE <= 0",
            vec![],
            Expectation::Zero,
        ),
    ];
    if require_today {
        checks.push(QualityCheck::new(
            "equity_today_present",
            "SELECT COUNT(*) FROM EQUITY_DAILY WHERE DATE = $1",
            vec![SqlValue::Date(run_date)],
            Expectation::NonZero,
        ));
        checks.push(QualityCheck::new(
            "fx_today_present",
            "SELECT COUNT(*) FROM FX_DAILY WHERE DATE = $1",
            vec![SqlValue::Date(run_date)],
            Expectation::NonZero,
        ));
    }
    checks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheckResult {
    pub run_id: String,
    pub run_date: NaiveDate,
    pub task_name: String,
    pub status: CheckStatus,
    pub record_count: Option<i64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityMode {
    /// Run every check and raise one alert listing all failures.
    #[default]
    Aggregate,
    /// Stop at the first failing check.
    FailFast,
}

impl FromStr for QualityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "aggregate" => Ok(QualityMode::Aggregate),
            "fail_fast" => Ok(QualityMode::FailFast),
            other => Err(format!("unknown quality mode '{other}' (expected aggregate or fail_fast)")),
        }
    }
}

const AUDIT_INSERT: &str = "INSERT INTO DQ_AUDIT_LOG \
     (RUN_ID, RUN_DATE, TASK_NAME, STATUS, RECORD_COUNT, ERROR_MESSAGE) \
     VALUES ($1, $2, $3, $4, $5, $6)";

pub struct QualityGate<'a> {
    warehouse: &'a dyn WarehousePort,
    notifier: &'a dyn NotifierPort,
    mode: QualityMode,
}

impl<'a> QualityGate<'a> {
    pub fn new(
        warehouse: &'a dyn WarehousePort,
        notifier: &'a dyn NotifierPort,
        mode: QualityMode,
    ) -> Self {
        Self {
            warehouse,
            notifier,
            mode,
        }
    }

    /// Evaluate `checks` for `run_date`. Returns every persisted result when
    /// all checks pass.
    pub fn run(
        &self,
        run_date: NaiveDate,
        checks: &[QualityCheck],
    ) -> Result<Vec<QualityCheckResult>, EtlError> {
        let run_id = Uuid::new_v4().to_string();
        info!(%run_id, %run_date, checks = checks.len(), mode = ?self.mode, "running quality checks");

        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            let result = self.evaluate(&run_id, run_date, check);
            self.persist(&result)?;
            let failed = result.status == CheckStatus::Fail;
            results.push(result);
            if failed && self.mode == QualityMode::FailFast {
                break;
            }
        }

        let failures: Vec<&QualityCheckResult> = results
            .iter()
            .filter(|r| r.status == CheckStatus::Fail)
            .collect();
        if failures.is_empty() {
            info!(%run_id, "all quality checks passed");
            return Ok(results);
        }

        let failed: Vec<String> = failures.iter().map(|r| r.task_name.clone()).collect();
        let details: Vec<String> = failures
            .iter()
            .map(|r| {
                format!(
                    "{}: {}",
                    r.task_name,
                    r.error_message.as_deref().unwrap_or("failed")
                )
            })
            .collect();
        let message = format!(
            "Data quality check failed for run {run_id} ({run_date}): {}",
            details.join("; ")
        );
        error!(%run_id, failed = ?failed, "quality gate failed");
        self.notifier.notify(&message);

        Err(EtlError::DataQualityFailure { failed, message })
    }

    fn evaluate(&self, run_id: &str, run_date: NaiveDate, check: &QualityCheck) -> QualityCheckResult {
        let (status, record_count, error_message) =
            match self.warehouse.query_scalar(&check.sql, &check.params) {
                Ok(value) => {
                    let count = value.and_then(|v| v.as_i64()).unwrap_or(0);
                    if check.expectation.holds(count) {
                        (CheckStatus::Pass, Some(count), None)
                    } else {
                        (
                            CheckStatus::Fail,
                            Some(count),
                            Some(check.expectation.describe(count)),
                        )
                    }
                }
                Err(e) => {
                    warn!(check = %check.name, error = %e, "quality check query failed");
                    (CheckStatus::Fail, None, Some(e.to_string()))
                }
            };
        info!(check = %check.name, status = %status, count = ?record_count, "quality check evaluated");

        QualityCheckResult {
            run_id: run_id.to_string(),
            run_date,
            task_name: check.name.clone(),
            status,
            record_count,
            error_message,
        }
    }

    fn persist(&self, result: &QualityCheckResult) -> Result<(), EtlError> {
        self.warehouse.execute(
            AUDIT_INSERT,
            &[
                SqlValue::Text(result.run_id.clone()),
                SqlValue::Date(result.run_date),
                SqlValue::Text(result.task_name.clone()),
                SqlValue::from(result.status.as_str()),
                result.record_count.map_or(SqlValue::Null, SqlValue::Integer),
                result
                    .error_message
                    .clone()
                    .map_or(SqlValue::Null, SqlValue::Text),
            ],
        )?;
        Ok(())
    }
}
