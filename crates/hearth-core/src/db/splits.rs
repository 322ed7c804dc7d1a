//! Split configuration lifecycle
//!
//! A transaction is either unconfigured or has exactly one configuration with
//! one allocation row per user. Create, update and delete each run in a single
//! SQLite transaction; delete writes its audit snapshot before removing rows.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::transactions::{require_transaction, row_to_transaction};
use super::users::fetch_users;
use super::{format_datetime, parse_datetime, Database};
use crate::allocation::{compute_allocations, round2, validate_allocations};
use crate::error::{Error, FieldError, Result};
use crate::household::HouseholdConfig;
use crate::legacy::derive_legacy_view;
use crate::models::{
    AllocationInput, AllocationLabel, ComputedAllocation, PaymentUpdate, SplitAllocation,
    SplitAudit, SplitConfig, SplitDetails, SplitType, SplitUpdateOutcome, SplitView, Transaction,
    TransactionType, User, UserBalance,
};

/// Body of a split create or update request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SplitRequest {
    /// Split type code; required on create, optional on update
    #[serde(default)]
    pub split_type: Option<String>,
    pub users: Vec<AllocationInput>,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn conversion_error(idx: usize, err: Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_config(row: &rusqlite::Row) -> rusqlite::Result<SplitConfig> {
    let type_str: String = row.get(2)?;
    let split_str: String = row.get(3)?;
    let created_at_str: String = row.get(5)?;
    let updated_at_str: String = row.get(6)?;
    Ok(SplitConfig {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        transaction_type: type_str
            .parse()
            .map_err(|e: String| conversion_error(2, Error::InvalidData(e)))?,
        split_type: split_str.parse().map_err(|e| conversion_error(3, e))?,
        created_by: row.get(4)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

fn row_to_allocation(row: &rusqlite::Row) -> rusqlite::Result<SplitAllocation> {
    let paid: i64 = row.get(6)?;
    let paid_date: Option<String> = row.get(7)?;
    Ok(SplitAllocation {
        id: row.get(0)?,
        config_id: row.get(1)?,
        user_id: row.get(2)?,
        display_name: row.get(3)?,
        amount: row.get(4)?,
        percentage: row.get(5)?,
        is_paid: paid != 0,
        paid_date: paid_date.as_deref().map(parse_datetime),
        notes: row.get(8)?,
    })
}

const ALLOCATION_SELECT: &str = r#"
    SELECT a.id, a.config_id, a.user_id, u.display_name, a.amount, a.percentage,
           a.is_paid, a.paid_date, a.notes
    FROM transaction_split_allocations a
    JOIN users u ON u.id = a.user_id
"#;

fn fetch_config(
    conn: &Connection,
    ty: TransactionType,
    transaction_id: i64,
) -> Result<Option<SplitConfig>> {
    let config = conn
        .query_row(
            r#"
            SELECT id, transaction_id, transaction_type, split_type, created_by, created_at, updated_at
            FROM transaction_split_configs
            WHERE transaction_id = ? AND transaction_type = ?
            "#,
            params![transaction_id, ty.code()],
            row_to_config,
        )
        .optional()?;
    Ok(config)
}

/// Refuse to change the amount of a transaction whose allocations depend on it
pub(crate) fn ensure_unconfigured(
    conn: &Connection,
    ty: TransactionType,
    transaction_id: i64,
) -> Result<()> {
    if fetch_config(conn, ty, transaction_id)?.is_some() {
        return Err(Error::Conflict(format!(
            "{} transaction {} has a split configuration; delete it before changing the amount",
            ty, transaction_id
        )));
    }
    Ok(())
}

fn fetch_allocations(conn: &Connection, config_id: i64) -> Result<Vec<SplitAllocation>> {
    let sql = format!("{} WHERE a.config_id = ? ORDER BY a.id", ALLOCATION_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let allocations = stmt
        .query_map(params![config_id], row_to_allocation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(allocations)
}

fn fetch_allocation(conn: &Connection, allocation_id: i64) -> Result<Option<SplitAllocation>> {
    let sql = format!("{} WHERE a.id = ?", ALLOCATION_SELECT);
    let allocation = conn
        .query_row(&sql, params![allocation_id], row_to_allocation)
        .optional()?;
    Ok(allocation)
}

/// Allocation users and split types for the given transactions
pub(crate) fn fetch_allocation_labels(
    conn: &Connection,
    ty: TransactionType,
    transaction_ids: &[i64],
) -> Result<HashMap<i64, Vec<AllocationLabel>>> {
    let mut by_transaction: HashMap<i64, Vec<AllocationLabel>> = HashMap::new();
    if transaction_ids.is_empty() {
        return Ok(by_transaction);
    }
    let wanted: HashSet<i64> = transaction_ids.iter().copied().collect();

    let mut stmt = conn.prepare(
        r#"
        SELECT c.transaction_id, a.user_id, c.split_type
        FROM transaction_split_configs c
        JOIN transaction_split_allocations a ON a.config_id = c.id
        WHERE c.transaction_type = ?
        ORDER BY c.transaction_id, a.id
        "#,
    )?;
    let rows = stmt
        .query_map(params![ty.code()], |row| {
            let split_str: String = row.get(2)?;
            Ok((
                row.get::<_, i64>(0)?,
                AllocationLabel {
                    user_id: row.get(1)?,
                    split_type: split_str.parse().map_err(|e| conversion_error(2, e))?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for (transaction_id, label) in rows {
        if wanted.contains(&transaction_id) {
            by_transaction.entry(transaction_id).or_default().push(label);
        }
    }
    Ok(by_transaction)
}

/// Every allocated user must be an active household member
fn check_users(users: &[User], inputs: &[AllocationInput], default_username: &str) -> Result<()> {
    let mut errors = Vec::new();
    for input in inputs {
        match users.iter().find(|u| u.id == input.user_id) {
            None => errors.push(FieldError::new(
                "users",
                format!("user {} does not exist", input.user_id),
            )),
            Some(u) if !u.is_active => errors.push(FieldError::new(
                "users",
                format!("user {} is not active", input.user_id),
            )),
            Some(u) if u.username == default_username => errors.push(FieldError::new(
                "users",
                "the reserved default user cannot receive allocations",
            )),
            Some(_) => {}
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::Validation(errors))
    }
}

/// Compute and reconcile allocations for a transaction
fn plan_allocations(
    conn: &Connection,
    transaction: &Transaction,
    split_type: SplitType,
    inputs: &[AllocationInput],
    config: &HouseholdConfig,
) -> Result<Vec<ComputedAllocation>> {
    if inputs.is_empty() {
        return Err(Error::invalid_field("users", "at least one user is required"));
    }
    let users = fetch_users(conn, false)?;
    check_users(&users, inputs, &config.default_username)?;

    let allocations = compute_allocations(transaction.amount, split_type, inputs)?;
    validate_allocations(&allocations, transaction.amount)?;
    Ok(allocations)
}

fn insert_allocations(
    conn: &Connection,
    config_id: i64,
    allocations: &[ComputedAllocation],
) -> Result<()> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO transaction_split_allocations (config_id, user_id, amount, percentage)
        VALUES (?, ?, ?, ?)
        "#,
    )?;
    for a in allocations {
        stmt.execute(params![config_id, a.user_id, a.amount, a.percentage])?;
    }
    Ok(())
}

fn explicit_details(
    conn: &Connection,
    transaction: Transaction,
    config: SplitConfig,
) -> Result<SplitDetails> {
    let allocations = fetch_allocations(conn, config.id)?;
    Ok(SplitDetails::new(
        transaction,
        SplitView::Explicit {
            config,
            allocations,
        },
    ))
}

/// Whether stored allocations already hold exactly the computed ones
fn same_allocations(stored: &[SplitAllocation], computed: &[ComputedAllocation]) -> bool {
    if stored.len() != computed.len() {
        return false;
    }
    let by_user: HashMap<i64, &SplitAllocation> = stored.iter().map(|a| (a.user_id, a)).collect();
    computed.iter().all(|c| {
        by_user.get(&c.user_id).is_some_and(|s| {
            (s.amount - c.amount).abs() < 1e-9 && (s.percentage - c.percentage).abs() < 1e-9
        })
    })
}

fn parse_split_type(code: Option<&str>) -> Result<Option<SplitType>> {
    code.map(str::parse::<SplitType>).transpose()
}

impl Database {
    /// Split a transaction among users
    pub fn create_split_config(
        &self,
        ty: TransactionType,
        transaction_id: i64,
        request: &SplitRequest,
        config: &HouseholdConfig,
    ) -> Result<SplitDetails> {
        let split_type = parse_split_type(request.split_type.as_deref())?
            .ok_or_else(|| Error::invalid_field("split_type", "is required"))?;

        self.with_transaction(|conn| {
            let transaction = require_transaction(conn, ty, transaction_id)?;

            if fetch_config(conn, ty, transaction_id)?.is_some() {
                return Err(Error::Conflict(format!(
                    "{} transaction {} already has a split configuration",
                    ty, transaction_id
                )));
            }

            let allocations =
                plan_allocations(conn, &transaction, split_type, &request.users, config)?;

            conn.execute(
                r#"
                INSERT INTO transaction_split_configs (transaction_id, transaction_type, split_type, created_by)
                VALUES (?, ?, ?, ?)
                "#,
                params![transaction_id, ty.code(), split_type.code(), request.created_by],
            )?;
            let config_id = conn.last_insert_rowid();
            insert_allocations(conn, config_id, &allocations)?;

            info!(
                domain = %ty,
                transaction_id,
                config_id,
                split_type = split_type.code(),
                users = allocations.len(),
                "Created split configuration"
            );

            let split_config = fetch_config(conn, ty, transaction_id)?
                .ok_or_else(|| Error::NotFound(format!("split config {}", config_id)))?;
            explicit_details(conn, transaction, split_config)
        })
    }

    /// Read a transaction's allocations, falling back to its legacy label
    pub fn get_split_details(
        &self,
        ty: TransactionType,
        transaction_id: i64,
        config: &HouseholdConfig,
    ) -> Result<SplitDetails> {
        let conn = self.conn()?;
        let transaction = require_transaction(&conn, ty, transaction_id)?;

        if let Some(split_config) = fetch_config(&conn, ty, transaction_id)? {
            return explicit_details(&conn, transaction, split_config);
        }

        let view = match ty {
            TransactionType::Shared => {
                let users = fetch_users(&conn, true)?;
                derive_legacy_view(&transaction, &users, config)
            }
            TransactionType::Personal | TransactionType::Offset => SplitView::Unallocated,
        };
        Ok(SplitDetails::new(transaction, view))
    }

    /// Replace a configuration's allocations
    ///
    /// When the recomputed allocations and split type match what is stored,
    /// nothing is written and payment status is left untouched.
    pub fn update_split_config(
        &self,
        ty: TransactionType,
        transaction_id: i64,
        request: &SplitRequest,
        config: &HouseholdConfig,
    ) -> Result<SplitUpdateOutcome> {
        let requested_type = parse_split_type(request.split_type.as_deref())?;

        self.with_transaction(|conn| {
            let transaction = require_transaction(conn, ty, transaction_id)?;
            let existing = fetch_config(conn, ty, transaction_id)?.ok_or_else(|| {
                Error::NotFound(format!(
                    "split configuration for {} transaction {}",
                    ty, transaction_id
                ))
            })?;

            let split_type = requested_type.unwrap_or(existing.split_type);
            let allocations =
                plan_allocations(conn, &transaction, split_type, &request.users, config)?;

            let stored = fetch_allocations(conn, existing.id)?;
            if split_type == existing.split_type && same_allocations(&stored, &allocations) {
                debug!(
                    domain = %ty,
                    transaction_id,
                    config_id = existing.id,
                    "Split configuration unchanged"
                );
                return Ok(SplitUpdateOutcome {
                    details: SplitDetails::new(
                        transaction,
                        SplitView::Explicit {
                            config: existing,
                            allocations: stored,
                        },
                    ),
                    no_op: true,
                });
            }

            conn.execute(
                "DELETE FROM transaction_split_allocations WHERE config_id = ?",
                params![existing.id],
            )?;
            insert_allocations(conn, existing.id, &allocations)?;

            let now = format_datetime(&Utc::now());
            if split_type != existing.split_type {
                conn.execute(
                    "UPDATE transaction_split_configs SET split_type = ?, updated_at = ? WHERE id = ?",
                    params![split_type.code(), now, existing.id],
                )?;
            } else {
                conn.execute(
                    "UPDATE transaction_split_configs SET updated_at = ? WHERE id = ?",
                    params![now, existing.id],
                )?;
            }

            info!(
                domain = %ty,
                transaction_id,
                config_id = existing.id,
                split_type = split_type.code(),
                users = allocations.len(),
                "Updated split configuration"
            );

            let split_config = fetch_config(conn, ty, transaction_id)?
                .ok_or_else(|| Error::NotFound(format!("split config {}", existing.id)))?;
            Ok(SplitUpdateOutcome {
                details: explicit_details(conn, transaction, split_config)?,
                no_op: false,
            })
        })
    }

    /// Remove a configuration, keeping an audit snapshot of it
    pub fn delete_split_config(
        &self,
        ty: TransactionType,
        transaction_id: i64,
        requested_by: &str,
    ) -> Result<SplitAudit> {
        self.with_transaction(|conn| {
            let existing = fetch_config(conn, ty, transaction_id)?.ok_or_else(|| {
                Error::NotFound(format!(
                    "split configuration for {} transaction {}",
                    ty, transaction_id
                ))
            })?;
            let allocations = fetch_allocations(conn, existing.id)?;
            let transaction = super::transactions::fetch_transaction(conn, ty, transaction_id)?;

            let snapshot = json!({
                "config": existing,
                "allocations": allocations,
                "transaction": transaction,
            });

            conn.execute(
                r#"
                INSERT INTO transaction_split_audit
                    (config_id, transaction_id, transaction_type, action, snapshot, requested_by)
                VALUES (?, ?, ?, 'delete', ?, ?)
                "#,
                params![
                    existing.id,
                    transaction_id,
                    ty.code(),
                    snapshot.to_string(),
                    requested_by
                ],
            )?;
            let audit_id = conn.last_insert_rowid();

            conn.execute(
                "DELETE FROM transaction_split_allocations WHERE config_id = ?",
                params![existing.id],
            )?;
            conn.execute(
                "DELETE FROM transaction_split_configs WHERE id = ?",
                params![existing.id],
            )?;

            info!(
                domain = %ty,
                transaction_id,
                config_id = existing.id,
                audit_id,
                requested_by,
                "Deleted split configuration"
            );

            fetch_audit(conn, audit_id)?
                .ok_or_else(|| Error::NotFound(format!("split audit {}", audit_id)))
        })
    }

    /// Change an allocation's payment status
    pub fn update_allocation_payment(
        &self,
        allocation_id: i64,
        update: &PaymentUpdate,
    ) -> Result<SplitAllocation> {
        self.with_transaction(|conn| {
            let current = fetch_allocation(conn, allocation_id)?
                .ok_or_else(|| Error::NotFound(format!("allocation {}", allocation_id)))?;

            // An explicit paid_date implies the allocation is paid
            let is_paid = update
                .is_paid
                .unwrap_or(current.is_paid || update.paid_date.is_some());

            let paid_date = if !is_paid {
                None
            } else if let Some(date) = update.paid_date {
                Some(date)
            } else if current.is_paid {
                current.paid_date.or_else(|| Some(Utc::now()))
            } else {
                Some(Utc::now())
            };

            let notes = match &update.notes {
                Some(n) => n
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from),
                None => current.notes.clone(),
            };

            conn.execute(
                r#"
                UPDATE transaction_split_allocations
                SET is_paid = ?, paid_date = ?, notes = ?
                WHERE id = ?
                "#,
                params![
                    is_paid,
                    paid_date.as_ref().map(format_datetime),
                    notes,
                    allocation_id
                ],
            )?;

            fetch_allocation(conn, allocation_id)?
                .ok_or_else(|| Error::NotFound(format!("allocation {}", allocation_id)))
        })
    }

    /// Split audit rows, newest first
    pub fn list_split_audit(
        &self,
        transaction: Option<(TransactionType, i64)>,
        limit: i64,
    ) -> Result<Vec<SplitAudit>> {
        let conn = self.conn()?;
        let limit = limit.clamp(1, 1000);

        let mut stmt;
        let rows = match transaction {
            Some((ty, id)) => {
                stmt = conn.prepare(&format!(
                    "{} WHERE transaction_type = ? AND transaction_id = ? ORDER BY id DESC LIMIT ?",
                    AUDIT_SELECT
                ))?;
                stmt.query_map(params![ty.code(), id, limit], row_to_audit)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                stmt = conn.prepare(&format!("{} ORDER BY id DESC LIMIT ?", AUDIT_SELECT))?;
                stmt.query_map(params![limit], row_to_audit)?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    /// Allocation users and split types keyed by transaction id
    pub fn allocations_by_transaction(
        &self,
        ty: TransactionType,
        transaction_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<AllocationLabel>>> {
        let conn = self.conn()?;
        fetch_allocation_labels(&conn, ty, transaction_ids)
    }

    /// Who owes what in a domain
    ///
    /// Explicit allocations count toward allocated and paid totals. Shared
    /// transactions without a configuration contribute their legacy shares,
    /// which are never paid.
    pub fn user_balances(
        &self,
        ty: TransactionType,
        config: &HouseholdConfig,
    ) -> Result<Vec<UserBalance>> {
        let conn = self.conn()?;
        let users: Vec<User> = fetch_users(&conn, true)?
            .into_iter()
            .filter(|u| u.username != config.default_username)
            .collect();

        let mut balances: BTreeMap<i64, UserBalance> = users
            .iter()
            .map(|u| {
                (
                    u.id,
                    UserBalance {
                        user_id: u.id,
                        display_name: u.display_name.clone(),
                        allocated: 0.0,
                        paid: 0.0,
                        outstanding: 0.0,
                        allocation_count: 0,
                    },
                )
            })
            .collect();

        let mut stmt = conn.prepare(
            r#"
            SELECT a.user_id, a.amount, a.is_paid
            FROM transaction_split_allocations a
            JOIN transaction_split_configs c ON c.id = a.config_id
            WHERE c.transaction_type = ?
            "#,
        )?;
        let explicit = stmt
            .query_map(params![ty.code()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, i64>(2)? != 0,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (user_id, amount, is_paid) in explicit {
            if let Some(balance) = balances.get_mut(&user_id) {
                balance.allocated += amount;
                if is_paid {
                    balance.paid += amount;
                }
                balance.allocation_count += 1;
            }
        }

        if ty == TransactionType::Shared {
            let sql = format!(
                r#"
                SELECT t.id, t.date, t.description, t.amount, t.category_id, t.category, t.label,
                       t.mark, t.has_split, t.split_from_id, t.closing_balance, t.created_at
                FROM {}_generalized t
                WHERE t.label IS NOT NULL
                  AND NOT EXISTS (
                      SELECT 1 FROM transaction_split_configs c
                      WHERE c.transaction_id = t.id AND c.transaction_type = ?
                  )
                "#,
                ty.table_name()
            );
            let mut stmt = conn.prepare(&sql)?;
            let legacy = stmt
                .query_map(params![ty.code()], row_to_transaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            for transaction in &legacy {
                if let SplitView::Legacy { allocations, .. } =
                    derive_legacy_view(transaction, &users, config)
                {
                    for a in allocations {
                        if let Some(balance) = balances.get_mut(&a.user_id) {
                            balance.allocated += a.amount;
                            balance.allocation_count += 1;
                        }
                    }
                }
            }
        }

        let mut result: Vec<UserBalance> = balances
            .into_values()
            .map(|mut b| {
                b.allocated = round2(b.allocated);
                b.paid = round2(b.paid);
                b.outstanding = round2(b.allocated - b.paid);
                b
            })
            .collect();
        result.sort_by_key(|b| b.display_name.to_lowercase());
        Ok(result)
    }
}

const AUDIT_SELECT: &str = r#"
    SELECT id, config_id, transaction_id, transaction_type, action, snapshot, requested_by, created_at
    FROM transaction_split_audit
"#;

fn row_to_audit(row: &rusqlite::Row) -> rusqlite::Result<SplitAudit> {
    let type_str: String = row.get(3)?;
    let snapshot_str: String = row.get(5)?;
    let created_at_str: String = row.get(7)?;
    Ok(SplitAudit {
        id: row.get(0)?,
        config_id: row.get(1)?,
        transaction_id: row.get(2)?,
        transaction_type: type_str
            .parse()
            .map_err(|e: String| conversion_error(3, Error::InvalidData(e)))?,
        action: row.get(4)?,
        snapshot: serde_json::from_str(&snapshot_str)
            .map_err(|e| conversion_error(5, Error::Json(e)))?,
        requested_by: row.get(6)?,
        created_at: parse_datetime(&created_at_str),
    })
}

fn fetch_audit(conn: &Connection, audit_id: i64) -> Result<Option<SplitAudit>> {
    let audit = conn
        .query_row(
            &format!("{} WHERE id = ?", AUDIT_SELECT),
            params![audit_id],
            row_to_audit,
        )
        .optional()?;
    Ok(audit)
}
