//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Hearth - Shared household finances, split fairly
#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "Self-hosted household finance tracker", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "hearth.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set HEARTH_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// Household config file (defaults to ~/.local/share/hearth/household.toml,
    /// then the built-in config)
    #[arg(long, global = true)]
    pub household: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Directory containing static files to serve (e.g., ui/dist)
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Manage household members
    Users {
        #[command(subcommand)]
        action: Option<UsersAction>,
    },

    /// Manage a domain's categories
    Categories {
        /// Transaction domain: shared, personal, offset
        domain: String,

        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// List transactions with their effective labels
    Transactions {
        /// Transaction domain: shared, personal, offset
        domain: String,

        /// Only show transactions with this effective label ("null" for unlabeled)
        #[arg(short, long)]
        label: Option<String>,

        /// Maximum number of transactions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: i64,

        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// End date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,
    },

    /// Manage how transactions are split between users
    Splits {
        #[command(subcommand)]
        action: SplitsAction,
    },

    /// Show who owes what in a domain
    Balances {
        /// Transaction domain: shared, personal, offset
        domain: String,
    },

    /// Show the audit log
    Audit {
        /// Show deleted split configurations for this transaction instead
        /// (requires --domain)
        #[arg(short, long)]
        transaction: Option<i64>,

        /// Transaction domain for --transaction
        #[arg(short, long, default_value = "shared")]
        domain: String,

        /// Maximum number of entries to show
        #[arg(short = 'n', long, default_value = "50")]
        limit: i64,
    },

    /// Legacy label maintenance
    Labels {
        #[command(subcommand)]
        action: LabelsAction,
    },
}

#[derive(Subcommand)]
pub enum UsersAction {
    /// List users
    List {
        /// Include deactivated users
        #[arg(short, long)]
        all: bool,
    },

    /// Add a household member
    Add {
        /// Login name (unique)
        username: String,

        /// Name shown in labels and balances (unique)
        display_name: String,
    },

    /// Deactivate a user (history is kept)
    Deactivate {
        /// User ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category (no-op if it exists)
    Add {
        /// Category name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum SplitsAction {
    /// Show a transaction's allocations (explicit or legacy)
    Show {
        /// Transaction domain: shared, personal, offset
        domain: String,

        /// Transaction ID
        transaction_id: i64,
    },

    /// Split a transaction among users
    ///
    /// Shares are USER_ID for equal splits, USER_ID=PERCENT for percentage
    /// splits and USER_ID=AMOUNT for fixed splits.
    /// Example: hearth splits create shared 42 --type percentage -s 2=60 -s 3=40
    Create {
        /// Transaction domain: shared, personal, offset
        domain: String,

        /// Transaction ID
        transaction_id: i64,

        /// Split type: equal, percentage, fixed
        #[arg(short = 't', long = "type", default_value = "equal")]
        split_type: String,

        /// User share (repeatable)
        #[arg(short, long = "share", required = true)]
        shares: Vec<String>,
    },

    /// Delete a transaction's split configuration
    Delete {
        /// Transaction domain: shared, personal, offset
        domain: String,

        /// Transaction ID
        transaction_id: i64,
    },
}

#[derive(Subcommand)]
pub enum LabelsAction {
    /// Label unlabeled shared transactions from their bank category
    Auto,
}
