//! Hearth CLI - Household finance tracker
//!
//! Usage:
//!   hearth init                          Initialize database
//!   hearth serve --port 3000             Start web server
//!   hearth transactions shared           List shared transactions
//!   hearth splits create shared 42 -s 2 -s 3   Split a transaction equally

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let household = cli.household.as_deref();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, household, cli.no_encrypt),
        Commands::Serve {
            port,
            host,
            static_dir,
        } => {
            commands::cmd_serve(
                &cli.db,
                household,
                &host,
                port,
                cli.no_encrypt,
                static_dir.as_deref(),
            )
            .await
        }
        Commands::Users { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_users_list(&db, false),
                Some(UsersAction::List { all }) => commands::cmd_users_list(&db, all),
                Some(UsersAction::Add {
                    username,
                    display_name,
                }) => commands::cmd_users_add(&db, &username, &display_name),
                Some(UsersAction::Deactivate { id }) => commands::cmd_users_deactivate(&db, id),
            }
        }
        Commands::Categories { domain, action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let ty = commands::parse_domain(&domain)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db, ty),
                Some(CategoriesAction::Add { name }) => {
                    commands::cmd_categories_add(&db, ty, &name)
                }
            }
        }
        Commands::Transactions {
            domain,
            label,
            limit,
            from,
            to,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_household(household)?;
            let ty = commands::parse_domain(&domain)?;
            let (start_date, end_date) = commands::parse_date_range(from.as_deref(), to.as_deref())?;
            commands::cmd_transactions_list(
                &db,
                &config,
                ty,
                label.as_deref(),
                limit,
                start_date,
                end_date,
            )
        }
        Commands::Splits { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_household(household)?;
            match action {
                SplitsAction::Show {
                    domain,
                    transaction_id,
                } => {
                    let ty = commands::parse_domain(&domain)?;
                    commands::cmd_splits_show(&db, &config, ty, transaction_id)
                }
                SplitsAction::Create {
                    domain,
                    transaction_id,
                    split_type,
                    shares,
                } => {
                    let ty = commands::parse_domain(&domain)?;
                    commands::cmd_splits_create(
                        &db,
                        &config,
                        ty,
                        transaction_id,
                        &split_type,
                        &shares,
                    )
                }
                SplitsAction::Delete {
                    domain,
                    transaction_id,
                } => {
                    let ty = commands::parse_domain(&domain)?;
                    commands::cmd_splits_delete(&db, ty, transaction_id)
                }
            }
        }
        Commands::Balances { domain } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_household(household)?;
            let ty = commands::parse_domain(&domain)?;
            commands::cmd_balances(&db, &config, ty)
        }
        Commands::Audit {
            transaction,
            domain,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match transaction {
                Some(id) => {
                    let ty = commands::parse_domain(&domain)?;
                    commands::cmd_split_audit(&db, ty, id, limit)
                }
                None => commands::cmd_audit(&db, limit),
            }
        }
        Commands::Labels { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_household(household)?;
            match action {
                LabelsAction::Auto => commands::cmd_labels_auto(&db, &config),
            }
        }
    }
}
