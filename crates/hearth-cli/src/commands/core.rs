//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_household` - Resolve the household config
//! - `parse_domain` / `parse_date_range` - Argument parsing helpers
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use hearth_core::models::TransactionType;
use hearth_core::{Database, HouseholdConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the household config, honoring an explicit --household path
pub fn load_household(path: Option<&Path>) -> Result<HouseholdConfig> {
    HouseholdConfig::load(path).context("Failed to load household config")
}

/// Parse a transaction domain argument (shared, personal, offset)
pub fn parse_domain(domain: &str) -> Result<TransactionType> {
    domain
        .parse::<TransactionType>()
        .map_err(|e| anyhow::anyhow!("{} (expected shared, personal or offset)", e))
}

/// Parse optional --from/--to dates
pub fn parse_date_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
    let parse = |s: &str, flag: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid --{} date format (use YYYY-MM-DD)", flag))
    };
    let start = from.map(|s| parse(s, "from")).transpose()?;
    let end = to.map(|s| parse(s, "to")).transpose()?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            anyhow::bail!("--from ({}) is after --to ({})", start, end);
        }
    }
    Ok((start, end))
}

pub fn cmd_init(db_path: &Path, household: Option<&Path>, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let config = load_household(household)?;
    let db = open_db(db_path, no_encrypt)?;

    db.ensure_reserved_user(&config.default_username)
        .context("Failed to seed default user")?;
    println!("   Seeded system user '{}'", config.default_username);

    for ty in TransactionType::all() {
        println!("   Domain: {:<9} → {}", ty.code(), ty.table_name());
    }

    match config.legacy_pair() {
        Some((a, b)) => println!("   Legacy \"Both\" label: {} + {}", a, b),
        None => println!("   ⚠️  No legacy members configured; \"Both\" labels stay unallocated"),
    }

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add household members: hearth users add ruby Ruby");
    println!("  2. Start web UI: hearth serve");

    Ok(())
}
