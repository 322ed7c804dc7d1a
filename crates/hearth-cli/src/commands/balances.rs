//! Balance command implementation

use anyhow::Result;
use hearth_core::models::TransactionType;
use hearth_core::{Database, HouseholdConfig};

use super::format_amount;

pub fn cmd_balances(db: &Database, config: &HouseholdConfig, ty: TransactionType) -> Result<()> {
    let balances = db.user_balances(ty, config)?;

    println!();
    println!("⚖️  {} balances", ty.label());
    println!("   ──────────────────────────────────────────────────────────────────");
    println!(
        "   {:<16} {:>12} {:>12} {:>12} {:>6}",
        "User", "Allocated", "Paid", "Outstanding", "Count"
    );

    for b in balances {
        println!(
            "   {:<16} {:>12} {:>12} {:>12} {:>6}",
            b.display_name,
            format!("{:.2}", b.allocated),
            format!("{:.2}", b.paid),
            format_amount(b.outstanding),
            b.allocation_count
        );
    }

    Ok(())
}
