//! Category command implementations

use anyhow::Result;
use hearth_core::models::TransactionType;
use hearth_core::Database;

pub fn cmd_categories_list(db: &Database, ty: TransactionType) -> Result<()> {
    let categories = db.list_categories(ty)?;

    if categories.is_empty() {
        println!("No {} categories yet. Add one with:", ty);
        println!("  hearth categories {} add Groceries", ty);
        return Ok(());
    }

    println!();
    println!("🏷️  {} categories", ty.label());
    println!("   ─────────────────────────────");
    for category in categories {
        println!("   [{:>3}] {}", category.id, category.category);
    }

    Ok(())
}

pub fn cmd_categories_add(db: &Database, ty: TransactionType, name: &str) -> Result<()> {
    let category = db.create_category(ty, name)?;
    println!(
        "✅ Category '{}' (ID {}) in {}",
        category.category,
        category.id,
        ty.category_table()
    );
    Ok(())
}
