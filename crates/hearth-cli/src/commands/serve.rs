//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};

use super::{load_household, open_db};

pub async fn cmd_serve(
    db_path: &Path,
    household: Option<&Path>,
    host: &str,
    port: u16,
    no_encrypt: bool,
    static_dir: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting Hearth web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);
    if let Some(dir) = static_dir {
        println!("   Static files: {}", dir.display());
    }

    let config = hearth_server::ServerConfig::from_env();
    if !config.allowed_origins.is_empty() {
        println!(
            "   🌐 Allowed origins: {} ({})",
            config.allowed_origins.join(", "),
            hearth_server::ALLOWED_ORIGINS_ENV
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let household = load_household(household)?;
    let db = open_db(db_path, no_encrypt)?;

    // Idempotent
    db.ensure_reserved_user(&household.default_username)
        .context("Failed to seed default user")?;

    let static_dir_str = static_dir
        .map(|p| p.to_str().context("static_dir path must be valid UTF-8"))
        .transpose()?;
    hearth_server::serve_with_config(db, household, host, port, static_dir_str, config).await?;

    Ok(())
}
