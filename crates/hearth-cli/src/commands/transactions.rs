//! Transaction command implementations

use anyhow::Result;
use chrono::NaiveDate;
use hearth_core::models::{TransactionQuery, TransactionType};
use hearth_core::{Database, HouseholdConfig};

use super::{format_amount, truncate};

pub fn cmd_transactions_list(
    db: &Database,
    config: &HouseholdConfig,
    ty: TransactionType,
    label: Option<&str>,
    limit: i64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Result<()> {
    let query = TransactionQuery {
        start_date,
        end_date,
        limit: Some(limit),
        ..Default::default()
    };
    let listing = db.list_labeled_transactions(ty, &query, label, config)?;

    if listing.transactions.is_empty() {
        println!("No {} transactions found.", ty);
        return Ok(());
    }

    println!();
    println!("📝 {} transactions", ty.label());
    println!("   ─────────────────────────────────────────────────────────────────────");

    for labeled in &listing.transactions {
        let tx = &labeled.transaction;
        let split_marker = if tx.has_split { " ✂" } else { "" };
        println!(
            "   [{:>5}] {} │ {:>10} │ {:<12} │ {}{}",
            tx.id,
            tx.date,
            format_amount(tx.amount),
            labeled.effective_label.as_deref().unwrap_or("-"),
            truncate(&tx.description, 36),
            split_marker
        );
    }

    let options: Vec<&str> = listing
        .label_options
        .iter()
        .map(|o| o.as_deref().unwrap_or("null"))
        .collect();
    println!();
    println!("   Labels: {}", options.join(", "));

    Ok(())
}
