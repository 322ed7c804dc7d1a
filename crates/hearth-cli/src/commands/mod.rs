//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Core commands (init) and shared utilities (open_db, load_household)
//! - `serve` - Web server command
//! - `users` - Household member commands (list, add, deactivate)
//! - `categories` - Per-domain category commands
//! - `transactions` - Labeled transaction listing
//! - `splits` - Split configuration commands (show, create, delete)
//! - `balances` - Per-user balance summary
//! - `audit` - Audit log and deleted split configurations
//! - `labels` - Legacy auto-labelling

pub mod audit;
pub mod balances;
pub mod categories;
pub mod core;
pub mod labels;
pub mod serve;
pub mod splits;
pub mod transactions;
pub mod users;

// Re-export command functions for main.rs
pub use audit::*;
pub use balances::*;
pub use categories::*;
pub use core::*;
pub use labels::*;
pub use serve::*;
pub use splits::*;
pub use transactions::*;
pub use users::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Format a signed amount, red for debits and green for credits
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[31m-${:.2}\x1b[0m", amount.abs())
    } else {
        format!("\x1b[32m+${:.2}\x1b[0m", amount)
    }
}
