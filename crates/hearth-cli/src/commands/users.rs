//! Household member command implementations

use anyhow::Result;
use hearth_core::Database;

pub fn cmd_users_list(db: &Database, include_inactive: bool) -> Result<()> {
    let users = if include_inactive {
        db.list_users()?
    } else {
        db.active_users()?
    };

    println!();
    println!("👥 Household Members");
    println!("   ─────────────────────────────────────────");

    for user in users {
        let status = if user.is_active { "" } else { " (inactive)" };
        println!(
            "   [{:>3}] {:<20} {}{}",
            user.id, user.display_name, user.username, status
        );
    }

    Ok(())
}

pub fn cmd_users_add(db: &Database, username: &str, display_name: &str) -> Result<()> {
    let user = db.create_user(username, display_name)?;
    println!(
        "✅ Added user {} ({}) with ID {}",
        user.display_name, user.username, user.id
    );
    Ok(())
}

pub fn cmd_users_deactivate(db: &Database, id: i64) -> Result<()> {
    let user = db.deactivate_user(id)?;
    println!("✅ Deactivated {} (ID {})", user.display_name, user.id);
    println!("   Existing allocations are kept; new splits can no longer include them.");
    Ok(())
}
