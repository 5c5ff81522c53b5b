//! Comparison policy: the knobs that shape classification and ranking.
//!
//! ## Float Normalization for Deterministic Hashing
//!
//! The tolerance is quantized (×1e6, rounded to i64) before it takes part
//! in `params_hash`, so equal policies hash equally on every platform.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_hash_hex, quantize};
use crate::types::ChangeStatus;
use crate::DEFAULT_POLICY_VERSION;

/// Default numeric tolerance below which a difference is not a change.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Relative slack absorbing float representation error at the tolerance
/// boundary (`100.01 - 100.0` is not exactly `0.01`).
const TOLERANCE_SLACK: f64 = f64::EPSILON * 16.0;

/// Order in which statuses break magnitude ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ChangeStatus>", into = "Vec<ChangeStatus>")]
pub struct StatusOrder([ChangeStatus; 3]);

impl StatusOrder {
    /// Build from a permutation of the three statuses.
    ///
    /// Returns `None` unless every status appears exactly once.
    pub fn new(order: [ChangeStatus; 3]) -> Option<Self> {
        let complete = ChangeStatus::ALL.iter().all(|s| order.contains(s));
        complete.then_some(Self(order))
    }

    /// Parse a comma-separated list such as `"removed,added,modified"`.
    pub fn parse(s: &str) -> Option<Self> {
        let statuses: Vec<ChangeStatus> = s
            .split(',')
            .map(ChangeStatus::parse)
            .collect::<Option<_>>()?;
        Self::try_from(statuses).ok()
    }

    /// Tie-break rank of a status (lower sorts first).
    pub fn rank(&self, status: ChangeStatus) -> usize {
        self.0.iter().position(|s| *s == status).unwrap_or(self.0.len())
    }

    /// Statuses in order.
    pub fn as_slice(&self) -> &[ChangeStatus] {
        &self.0
    }
}

impl Default for StatusOrder {
    fn default() -> Self {
        Self(ChangeStatus::ALL)
    }
}

impl TryFrom<Vec<ChangeStatus>> for StatusOrder {
    type Error = String;

    fn try_from(statuses: Vec<ChangeStatus>) -> Result<Self, Self::Error> {
        let order: [ChangeStatus; 3] = statuses
            .try_into()
            .map_err(|v: Vec<ChangeStatus>| format!("expected 3 statuses, got {}", v.len()))?;
        Self::new(order).ok_or_else(|| "status order must list each status once".to_string())
    }
}

impl From<StatusOrder> for Vec<ChangeStatus> {
    fn from(order: StatusOrder) -> Self {
        order.0.to_vec()
    }
}

impl fmt::Display for StatusOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(ChangeStatus::as_str).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Quantized policy parameters for deterministic hashing.
#[derive(Serialize)]
struct QuantizedPolicyParams<'a> {
    version: &'a str,
    tolerance: i64,
    status_order: Vec<ChangeStatus>,
    max_table_rows: Option<usize>,
    deduplicate: bool,
}

/// Comparison policy.
///
/// ## Parameters
///
/// - `tolerance`: numeric differences `<=` this are not changes
/// - `status_order`: magnitude tie-break order between statuses
/// - `max_table_rows`: cap on the rendered table (stats stay complete)
/// - `deduplicate`: drop changes re-observed across transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonPolicy {
    /// Policy version identifier.
    pub version: String,
    /// Numeric tolerance.
    pub tolerance: f64,
    /// Tie-break order between statuses.
    pub status_order: StatusOrder,
    /// Maximum rows in `comparison_table`; `None` keeps every row.
    pub max_table_rows: Option<usize>,
    /// Deduplicate across transitions in N-way comparisons.
    pub deduplicate: bool,
}

impl ComparisonPolicy {
    /// Policy with a custom tolerance and defaults elsewhere.
    ///
    /// Negative or non-finite tolerances fall back to the default.
    pub fn with_tolerance(tolerance: f64) -> Self {
        let tolerance = if tolerance.is_finite() && tolerance >= 0.0 {
            tolerance
        } else {
            DEFAULT_TOLERANCE
        };
        Self {
            tolerance,
            ..Self::default()
        }
    }

    /// Read overrides from the environment.
    ///
    /// - `DECK_DIFF_TOLERANCE`: numeric tolerance
    /// - `DECK_DIFF_MAX_ROWS`: table row cap (`0` = unlimited)
    /// - `DECK_DIFF_STATUS_ORDER`: e.g. `removed,modified,added`
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        let mut policy = Self::default();

        if let Ok(raw) = std::env::var("DECK_DIFF_TOLERANCE") {
            match raw.trim().parse::<f64>() {
                Ok(t) if t.is_finite() && t >= 0.0 => policy.tolerance = t,
                _ => tracing::warn!(value = %raw, "ignoring invalid DECK_DIFF_TOLERANCE"),
            }
        }

        if let Ok(raw) = std::env::var("DECK_DIFF_MAX_ROWS") {
            match raw.trim().parse::<usize>() {
                Ok(0) => policy.max_table_rows = None,
                Ok(n) => policy.max_table_rows = Some(n),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid DECK_DIFF_MAX_ROWS"),
            }
        }

        if let Ok(raw) = std::env::var("DECK_DIFF_STATUS_ORDER") {
            match StatusOrder::parse(&raw) {
                Some(order) => policy.status_order = order,
                None => tracing::warn!(value = %raw, "ignoring invalid DECK_DIFF_STATUS_ORDER"),
            }
        }

        policy
    }

    /// Get the policy ID.
    pub fn policy_id(&self) -> &str {
        &self.version
    }

    /// Whether two numbers are equal within tolerance.
    pub fn within_tolerance(&self, a: f64, b: f64) -> bool {
        let scale = a.abs().max(b.abs()).max(1.0);
        (b - a).abs() <= self.tolerance + TOLERANCE_SLACK * scale
    }

    /// Hash of the policy parameters, with the tolerance quantized.
    pub fn params_hash(&self) -> String {
        canonical_hash_hex(&QuantizedPolicyParams {
            version: &self.version,
            tolerance: quantize(self.tolerance),
            status_order: self.status_order.into(),
            max_table_rows: self.max_table_rows,
            deduplicate: self.deduplicate,
        })
    }
}

impl Default for ComparisonPolicy {
    fn default() -> Self {
        Self {
            version: DEFAULT_POLICY_VERSION.to_string(),
            tolerance: DEFAULT_TOLERANCE,
            status_order: StatusOrder::default(),
            max_table_rows: None,
            deduplicate: true,
        }
    }
}
