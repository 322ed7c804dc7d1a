//! Legacy label commands

use anyhow::Result;
use hearth_core::{Database, HouseholdConfig};

pub fn cmd_labels_auto(db: &Database, config: &HouseholdConfig) -> Result<()> {
    if config.legacy_pair().is_none() {
        println!("⚠️  No legacy members configured; nothing to label.");
        return Ok(());
    }

    let labelled = db.apply_auto_labels(config)?;
    if labelled == 0 {
        println!("✅ All shared transactions already labelled.");
    } else {
        println!("✅ Labelled {} shared transactions from bank categories", labelled);
    }
    Ok(())
}
