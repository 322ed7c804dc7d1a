//! Split allocation engine
//!
//! Divides a transaction's amount among users according to a [`SplitType`]
//! and checks that the result reconciles to the transaction total. Amount and
//! percentage are computed independently per strategy, so `fixed` splits whose
//! amounts do not fall on round percentages still pass one uniform check.
//!
//! Every allocation carries the sign of the parent transaction. Equal splits
//! are computed in whole cents and hundredths of a percent; whatever does not
//! divide evenly lands on the last user.

use std::collections::HashSet;

use crate::error::{Error, FieldError, Result};
use crate::models::{AllocationInput, ComputedAllocation, SplitType};

/// Reconciliation tolerance for amounts and percentages
pub const TOLERANCE: f64 = 0.01;

/// Slack for binary floating point when comparing against [`TOLERANCE`]
const FLOAT_SLACK: f64 = 1e-9;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Whether `a` and `b` agree within [`TOLERANCE`]
pub fn within_tolerance(a: f64, b: f64) -> bool {
    (a - b).abs() <= TOLERANCE + FLOAT_SLACK
}

/// Divide `units` into `n` whole parts, the last absorbing the remainder
fn even_parts(units: i64, n: i64) -> impl Iterator<Item = i64> {
    let base = units / n;
    let last = units - base * (n - 1);
    (0..n).map(move |i| if i == n - 1 { last } else { base })
}

fn sign_of(total: f64) -> f64 {
    if total < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Reject inputs no strategy can allocate
fn check_inputs(total_amount: f64, inputs: &[AllocationInput]) -> Result<()> {
    let mut errors = Vec::new();

    if inputs.is_empty() {
        errors.push(FieldError::new("users", "at least one user is required"));
    }
    if !total_amount.is_finite() || total_amount == 0.0 {
        errors.push(FieldError::new(
            "amount",
            "cannot allocate a zero-amount transaction",
        ));
    }

    let mut seen = HashSet::new();
    for input in inputs {
        if !seen.insert(input.user_id) {
            errors.push(FieldError::new(
                "users",
                format!("user {} appears more than once", input.user_id),
            ));
        }
        if let Some(p) = input.percentage {
            if !(0.0..=100.0).contains(&p) {
                errors.push(FieldError::new(
                    "percentage",
                    format!("percentage for user {} must be between 0 and 100", input.user_id),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

/// Compute per-user allocations for `total_amount`
pub fn compute_allocations(
    total_amount: f64,
    split_type: SplitType,
    inputs: &[AllocationInput],
) -> Result<Vec<ComputedAllocation>> {
    check_inputs(total_amount, inputs)?;

    let sign = sign_of(total_amount);
    let magnitude = total_amount.abs();

    match split_type {
        SplitType::Equal => {
            let n = inputs.len() as i64;
            let cents = (magnitude * 100.0).round() as i64;
            let shares = even_parts(cents, n);
            let percentages = even_parts(10_000, n);
            Ok(inputs
                .iter()
                .zip(shares.zip(percentages))
                .map(|(input, (share, percentage))| ComputedAllocation {
                    user_id: input.user_id,
                    amount: sign * share as f64 / 100.0,
                    percentage: percentage as f64 / 100.0,
                })
                .collect())
        }
        SplitType::Percentage => inputs
            .iter()
            .map(|input| {
                let percentage = input.percentage.ok_or(Error::MissingSplitField {
                    user_id: input.user_id,
                    field: "percentage",
                })?;
                Ok(ComputedAllocation {
                    user_id: input.user_id,
                    amount: sign * round2(magnitude * percentage / 100.0),
                    percentage: round2(percentage),
                })
            })
            .collect(),
        SplitType::Fixed => inputs
            .iter()
            .map(|input| {
                let amount = input.amount.ok_or(Error::MissingSplitField {
                    user_id: input.user_id,
                    field: "amount",
                })?;
                // The caller's sign is discarded; the parent's sign wins.
                Ok(ComputedAllocation {
                    user_id: input.user_id,
                    amount: sign * round2(amount.abs()),
                    percentage: round2(amount.abs() / magnitude * 100.0),
                })
            })
            .collect(),
    }
}

/// Check that allocations add up to the transaction and to 100%
pub fn validate_allocations(allocations: &[ComputedAllocation], total_amount: f64) -> Result<()> {
    let allocated_amount: f64 = allocations.iter().map(|a| a.amount.abs()).sum();
    let allocated_percentage: f64 = allocations.iter().map(|a| a.percentage).sum();
    let expected_amount = total_amount.abs();

    if within_tolerance(allocated_amount, expected_amount)
        && within_tolerance(allocated_percentage, 100.0)
    {
        Ok(())
    } else {
        Err(Error::Reconciliation {
            expected_amount,
            allocated_amount: round2(allocated_amount),
            expected_percentage: 100.0,
            allocated_percentage: round2(allocated_percentage),
        })
    }
}
