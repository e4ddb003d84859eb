use anyhow::{Result, anyhow};
use serde::Deserialize;

/// How a fan-out stage in a pipeline file combines its sub-results.
///
/// - `Sum`: add all results (default).
/// - `Product`: multiply all results.
/// - `Max`: keep the largest result; an empty fan-out reduces to `0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReduceOp {
    #[default]
    Sum,
    Product,
    Max,
}

impl ReduceOp {
    /// Reduce `values`, failing instead of wrapping on `i64` overflow.
    pub fn apply(self, values: &[i64]) -> Result<i64> {
        let reduced = match self {
            ReduceOp::Sum => values
                .iter()
                .try_fold(0_i64, |acc, &v| acc.checked_add(v)),
            ReduceOp::Product => values
                .iter()
                .try_fold(1_i64, |acc, &v| acc.checked_mul(v)),
            ReduceOp::Max => Some(values.iter().copied().max().unwrap_or(0)),
        };
        reduced.ok_or_else(|| anyhow!("arithmetic overflow reducing {values:?} with {self:?}"))
    }
}
