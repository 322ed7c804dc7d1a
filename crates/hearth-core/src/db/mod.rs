//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `users` - Household member directory
//! - `categories` - Per-domain category tables and name/id resolution
//! - `transactions` - Transaction CRUD, bulk mark, amount splits, auto-labels
//! - `splits` - Split configuration lifecycle, payments, balances
//! - `audit` - API access audit log

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::TransactionType;

mod audit;
mod categories;
mod splits;
mod transactions;
mod users;

pub use splits::SplitRequest;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "HEARTH_DB_KEY";

/// Username of the system user seeded by migrations
pub const SEED_DEFAULT_USERNAME: &str = "default";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"hearth-salt-v1-x";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// Format a timestamp the way SQLite's CURRENT_TIMESTAMP does
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
    /// Whether connections were opened with a key
    encrypted: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `HEARTH_DB_KEY` environment variable to be set. Use
    /// `new_unencrypted()` for development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let encrypted = passphrase.is_some();
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Pragmas are per connection, so every pooled connection gets them
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            encrypted,
        };
        db.run_migrations()?;
        db.verify_transaction_types()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir()
            .join(format!("hearth_test_{}_{}.db", std::process::id(), id))
            .to_string_lossy()
            .into_owned();

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && self.encrypted)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run `f` inside one SQLite transaction
    ///
    /// Commits when `f` returns `Ok`. Any `Err` (or panic) drops the
    /// uncommitted transaction, which rolls it back.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Check the transaction type directory against the compiled mapping
    pub fn verify_transaction_types(&self) -> Result<()> {
        let conn = self.conn()?;
        for ty in TransactionType::all() {
            let table: Option<String> = conn
                .query_row(
                    "SELECT table_name FROM transaction_types WHERE code = ?",
                    params![ty.code()],
                    |row| row.get(0),
                )
                .optional()?;
            match table {
                Some(t) if t == ty.table_name() => {}
                Some(t) => {
                    return Err(Error::Config(format!(
                        "transaction type '{}' maps to '{}', expected '{}'",
                        ty.code(),
                        t,
                        ty.table_name()
                    )))
                }
                None => {
                    return Err(Error::Config(format!(
                        "transaction type '{}' missing from directory",
                        ty.code()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS transaction_types (
                code TEXT PRIMARY KEY,
                label TEXT NOT NULL,
                table_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transaction_split_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER NOT NULL,
                transaction_type TEXT NOT NULL REFERENCES transaction_types(code),
                split_type TEXT NOT NULL,                  -- equal, percentage, fixed
                created_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(transaction_id, transaction_type)
            );

            CREATE TABLE IF NOT EXISTS transaction_split_allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_id INTEGER NOT NULL REFERENCES transaction_split_configs(id),
                user_id INTEGER NOT NULL REFERENCES users(id),
                amount REAL NOT NULL,                      -- same sign as the transaction
                percentage REAL NOT NULL,
                is_paid BOOLEAN NOT NULL DEFAULT 0,
                paid_date DATETIME,
                notes TEXT,
                UNIQUE(config_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_split_allocations_config ON transaction_split_allocations(config_id);
            CREATE INDEX IF NOT EXISTS idx_split_allocations_user ON transaction_split_allocations(user_id);

            -- Append-only; rows are never updated or deleted
            CREATE TABLE IF NOT EXISTS transaction_split_audit (
                id INTEGER PRIMARY KEY,
                config_id INTEGER NOT NULL,
                transaction_id INTEGER NOT NULL,
                transaction_type TEXT NOT NULL,
                action TEXT NOT NULL,
                snapshot TEXT NOT NULL,                    -- JSON of config, allocations, transaction
                requested_by TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_split_audit_transaction ON transaction_split_audit(transaction_type, transaction_id);

            CREATE TABLE IF NOT EXISTS audit_log (
                id INTEGER PRIMARY KEY,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                user_email TEXT NOT NULL,
                action TEXT NOT NULL,
                entity_type TEXT,
                entity_id INTEGER,
                details TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_audit_log_user ON audit_log(user_email);
            CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log(timestamp);
            "#,
        )?;

        for ty in TransactionType::all() {
            conn.execute_batch(&domain_schema(*ty))?;
            conn.execute(
                "INSERT OR IGNORE INTO transaction_types (code, label, table_name) VALUES (?, ?, ?)",
                params![ty.code(), ty.label(), ty.table_name()],
            )?;
        }

        conn.execute(
            "INSERT OR IGNORE INTO users (username, display_name, is_active) VALUES (?, 'Default', 1)",
            params![SEED_DEFAULT_USERNAME],
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}

/// Tables, indexes and generalized view for one domain
///
/// Only the enum's static table names are formatted in.
fn domain_schema(ty: TransactionType) -> String {
    let table = ty.table_name();
    let categories = ty.category_table();
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {categories} (
            id INTEGER PRIMARY KEY,
            category TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS {table} (
            id INTEGER PRIMARY KEY,
            date DATE NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            category INTEGER REFERENCES {categories}(id),
            label TEXT,
            mark BOOLEAN NOT NULL DEFAULT 0,
            has_split BOOLEAN NOT NULL DEFAULT 0,
            split_from_id INTEGER REFERENCES {table}(id),
            closing_balance REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE INDEX IF NOT EXISTS idx_{table}_date ON {table}(date);
        CREATE INDEX IF NOT EXISTS idx_{table}_split_from ON {table}(split_from_id);

        CREATE VIEW IF NOT EXISTS {table}_generalized AS
            SELECT t.id, t.date, t.description, t.amount, t.category AS category_id,
                   c.category AS category, t.label, t.mark, t.has_split,
                   t.split_from_id, t.closing_balance, t.created_at
            FROM {table} t
            LEFT JOIN {categories} c ON c.id = t.category;
        "#
    )
}

/// Audit log entry
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub user_email: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
}

#[cfg(test)]
mod tests;
