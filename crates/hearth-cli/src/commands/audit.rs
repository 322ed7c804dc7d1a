//! Audit command implementations

use anyhow::Result;
use hearth_core::models::TransactionType;
use hearth_core::Database;

pub fn cmd_audit(db: &Database, limit: i64) -> Result<()> {
    let entries = db.list_audit_log(limit)?;

    if entries.is_empty() {
        println!("Audit log is empty.");
        return Ok(());
    }

    println!();
    println!("📜 Audit log");
    println!("   ─────────────────────────────────────────────────────────────");
    for e in entries {
        let target = match (&e.entity_type, e.entity_id) {
            (Some(t), Some(id)) => format!("{} {}", t, id),
            (Some(t), None) => t.clone(),
            _ => String::new(),
        };
        println!(
            "   {} │ {:<24} │ {:<10} │ {} {}",
            e.timestamp,
            e.user_email,
            e.action,
            target,
            e.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

/// Deleted split configurations for one transaction
pub fn cmd_split_audit(
    db: &Database,
    ty: TransactionType,
    transaction_id: i64,
    limit: i64,
) -> Result<()> {
    let records = db.list_split_audit(Some((ty, transaction_id)), limit)?;

    if records.is_empty() {
        println!("No deleted split configurations for {} transaction {}.", ty, transaction_id);
        return Ok(());
    }

    println!();
    println!("🗂️  Split history for {} transaction {}", ty, transaction_id);
    println!("   ─────────────────────────────────────────────────────────────");
    for r in records {
        println!(
            "   [{}] {} │ {} config {} by {}",
            r.id, r.created_at, r.action, r.config_id, r.requested_by
        );
        println!("        {}", serde_json::to_string(&r.snapshot)?);
    }

    Ok(())
}
