//! Split configuration command implementations

use anyhow::{Context, Result};
use hearth_core::models::{AllocationInput, SplitDetails, SplitType, SplitView, TransactionType};
use hearth_core::{Database, HouseholdConfig, SplitRequest};

use super::{format_amount, truncate};

/// Actor recorded on splits made from the command line
pub const CLI_ACTOR: &str = "cli";

/// Parse `USER_ID` or `USER_ID=VALUE` shares for a split type
///
/// The value is a percentage for percentage splits and an amount for fixed
/// splits. Equal splits take bare user ids.
pub fn parse_shares(split_type: SplitType, shares: &[String]) -> Result<Vec<AllocationInput>> {
    shares
        .iter()
        .map(|share| {
            let (user, value) = match share.split_once('=') {
                Some((user, value)) => (user, Some(value)),
                None => (share.as_str(), None),
            };
            let user_id: i64 = user
                .trim()
                .parse()
                .with_context(|| format!("Invalid user id in share '{}'", share))?;
            let value = value
                .map(|v| {
                    v.trim()
                        .parse::<f64>()
                        .with_context(|| format!("Invalid value in share '{}'", share))
                })
                .transpose()?;

            let (percentage, amount) = match split_type {
                SplitType::Equal if value.is_some() => {
                    anyhow::bail!("Equal splits take bare user ids, got '{}'", share)
                }
                SplitType::Equal => (None, None),
                SplitType::Percentage => (value, None),
                SplitType::Fixed => (None, value),
            };

            Ok(AllocationInput {
                user_id,
                percentage,
                amount,
            })
        })
        .collect()
}

fn print_details(details: &SplitDetails) {
    let tx = &details.transaction;
    println!();
    println!(
        "   [{}] {} │ {} │ {}",
        tx.id,
        tx.date,
        format_amount(tx.amount),
        truncate(&tx.description, 40)
    );
    println!("   ─────────────────────────────────────────────────────────────");

    match &details.view {
        SplitView::Explicit { config, allocations } => {
            println!(
                "   {} (config {}, by {})",
                config.split_type.label(),
                config.id,
                config.created_by.as_deref().unwrap_or("unknown")
            );
            for a in allocations {
                let paid = if a.is_paid { "✓ paid" } else { "" };
                println!(
                    "   [{:>4}] {:<16} {:>10}  {:>6.2}%  {}",
                    a.id,
                    a.display_name,
                    format_amount(a.amount),
                    a.percentage,
                    paid
                );
            }
        }
        SplitView::Legacy { label, allocations } => {
            println!("   Legacy label \"{}\" (no split configuration)", label);
            for a in allocations {
                println!(
                    "          {:<16} {:>10}  {:>6.2}%",
                    a.display_name,
                    format_amount(a.amount),
                    a.percentage
                );
            }
        }
        SplitView::Unallocated => {
            println!("   Not split. Create one with:");
            println!("   hearth splits create <domain> {} -s <user_id> ...", tx.id);
        }
    }
}

pub fn cmd_splits_show(
    db: &Database,
    config: &HouseholdConfig,
    ty: TransactionType,
    transaction_id: i64,
) -> Result<()> {
    let details = db.get_split_details(ty, transaction_id, config)?;
    print_details(&details);
    Ok(())
}

pub fn cmd_splits_create(
    db: &Database,
    config: &HouseholdConfig,
    ty: TransactionType,
    transaction_id: i64,
    split_type: &str,
    shares: &[String],
) -> Result<()> {
    let parsed: SplitType = split_type.parse()?;
    tracing::debug!(transaction_id, split_type = parsed.code(), "Creating split from CLI");
    let request = SplitRequest {
        split_type: Some(parsed.code().to_string()),
        users: parse_shares(parsed, shares)?,
        created_by: Some(CLI_ACTOR.to_string()),
    };

    let details = db.create_split_config(ty, transaction_id, &request, config)?;

    println!(
        "✅ Split transaction {} among {} users",
        transaction_id,
        details.view.allocation_count()
    );
    print_details(&details);
    Ok(())
}

pub fn cmd_splits_delete(db: &Database, ty: TransactionType, transaction_id: i64) -> Result<()> {
    let audit = db.delete_split_config(ty, transaction_id, CLI_ACTOR)?;
    println!(
        "✅ Deleted split configuration {} for transaction {}",
        audit.config_id, transaction_id
    );
    println!("   Snapshot kept as split audit entry {}", audit.id);
    Ok(())
}
