//! Transaction CRUD, bulk mark updates, amount splits and legacy auto-labels

use std::collections::HashMap;

use chrono::NaiveDate;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::categories::resolve_ref_to_id;
use super::splits::{ensure_unconfigured, fetch_allocation_labels};
use super::users::fetch_users;
use super::{parse_datetime, Database};
use crate::allocation::{round2, within_tolerance};
use crate::error::{Error, FieldError, Result};
use crate::household::HouseholdConfig;
use crate::labels::{matches_label, reconcile, LabeledListing};
use crate::legacy::auto_label;
use crate::models::{
    AmountSplitOutcome, AmountSplitRequest, BulkMarkOutcome, BulkMarkRequest, NewTransaction,
    Transaction, TransactionQuery, TransactionType, UpdateOutcome,
};
use crate::mutation::{category_ref, parse_new_transaction, parse_update, FieldValue, TxField};
use crate::normalize::{coerce, normalize, FieldType, NormalizedValue};

/// Default and maximum page size for listings
const DEFAULT_LIMIT: i64 = 200;
const MAX_LIMIT: i64 = 1000;

const VIEW_COLUMNS: &str = "id, date, description, amount, category_id, category, label, mark, \
                            has_split, split_from_id, closing_balance, created_at";

pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let date_str: String = row.get(1)?;
    let mark: i64 = row.get(7)?;
    let has_split: i64 = row.get(8)?;
    let created_at_str: String = row.get(11)?;
    Ok(Transaction {
        id: row.get(0)?,
        date: NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?,
        description: row.get(2)?,
        amount: row.get(3)?,
        category_id: row.get(4)?,
        category: row.get(5)?,
        label: row.get(6)?,
        mark: mark != 0,
        has_split: has_split != 0,
        split_from_id: row.get(9)?,
        closing_balance: row.get(10)?,
        created_at: parse_datetime(&created_at_str),
    })
}

/// Read one transaction through the domain's generalized view
pub(crate) fn fetch_transaction(
    conn: &Connection,
    ty: TransactionType,
    id: i64,
) -> Result<Option<Transaction>> {
    let sql = format!(
        "SELECT {} FROM {}_generalized WHERE id = ?",
        VIEW_COLUMNS,
        ty.table_name()
    );
    let tx = conn
        .query_row(&sql, params![id], row_to_transaction)
        .optional()?;
    Ok(tx)
}

pub(crate) fn require_transaction(
    conn: &Connection,
    ty: TransactionType,
    id: i64,
) -> Result<Transaction> {
    fetch_transaction(conn, ty, id)?
        .ok_or_else(|| Error::NotFound(format!("{} transaction {}", ty, id)))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn sign_of(amount: f64) -> f64 {
    if amount < 0.0 {
        -1.0
    } else {
        1.0
    }
}

/// Storage representation of a normalized value
fn to_sql(value: &NormalizedValue) -> SqlValue {
    match value {
        NormalizedValue::Absent => SqlValue::Null,
        NormalizedValue::Text(s) => SqlValue::Text(s.clone()),
        NormalizedValue::Number(n) => SqlValue::Real(*n),
        NormalizedValue::Date(d) => SqlValue::Text(format_date(*d)),
        NormalizedValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
    }
}

/// Current stored value of a field, as JSON for normalization
fn stored_value(tx: &Transaction, field: TxField) -> Value {
    match field {
        TxField::Date => json!(format_date(tx.date)),
        TxField::Description => json!(tx.description),
        TxField::Amount => json!(tx.amount),
        TxField::Category => json!(tx.category_id),
        TxField::Label => json!(tx.label),
        TxField::Mark => json!(tx.mark),
        TxField::ClosingBalance => json!(tx.closing_balance),
    }
}

/// Translate constraint failures on transaction writes into caller errors
fn map_write_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("FOREIGN KEY") {
                return Error::invalid_field("category", "refers to an unknown category");
            }
            if message.contains("UNIQUE") || message.contains("PRIMARY KEY") {
                return Error::Conflict("a transaction with this id already exists".to_string());
            }
        }
    }
    Error::Database(err)
}

fn insert_transaction(
    conn: &Connection,
    ty: TransactionType,
    new: &NewTransaction,
    category_id: Option<i64>,
    split_from_id: Option<i64>,
) -> Result<i64> {
    let sql = format!(
        r#"
        INSERT INTO {} (id, date, description, amount, category, label, mark, split_from_id, closing_balance)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        ty.table_name()
    );
    conn.execute(
        &sql,
        params![
            new.id,
            format_date(new.date),
            new.description,
            new.amount,
            category_id,
            new.label,
            new.mark,
            split_from_id,
            new.closing_balance,
        ],
    )
    .map_err(map_write_error)?;
    Ok(conn.last_insert_rowid())
}

/// WHERE clause and parameters for a bulk mark request
struct Criteria {
    conditions: Vec<String>,
    params: Vec<SqlValue>,
}

impl Criteria {
    fn where_clause(&self) -> String {
        self.conditions.join(" AND ")
    }
}

fn bulk_criteria(
    conn: &Connection,
    ty: TransactionType,
    request: &BulkMarkRequest,
) -> Result<Criteria> {
    let mut conditions = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    let mut errors = Vec::new();

    if let Some(ids) = request.transaction_ids.as_ref().filter(|ids| !ids.is_empty()) {
        let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
        conditions.push(format!("id IN ({})", placeholders.join(", ")));
        params.extend(ids.iter().map(|id| SqlValue::Integer(*id)));
    }
    if let Some(start) = request.start_date {
        conditions.push("date >= ?".to_string());
        params.push(SqlValue::Text(format_date(start)));
    }
    if let Some(end) = request.end_date {
        conditions.push("date <= ?".to_string());
        params.push(SqlValue::Text(format_date(end)));
    }

    for (key, raw) in &request.filters {
        // has_split is filterable even though clients cannot write it
        let (column, value) = if key == "has_split" {
            match coerce(raw, FieldType::Boolean) {
                Ok(v) => ("has_split", to_sql(&v)),
                Err(message) => {
                    errors.push(FieldError::new(key.clone(), message));
                    continue;
                }
            }
        } else {
            let Some(field) = TxField::from_key(key) else {
                errors.push(FieldError::new(key.clone(), "is not a filterable field"));
                continue;
            };
            if field == TxField::Category {
                let category = match category_ref(raw) {
                    Ok(c) => c,
                    Err(message) => {
                        errors.push(FieldError::new(key.clone(), message));
                        continue;
                    }
                };
                let id = resolve_ref_to_id(conn, ty, category.as_ref())?;
                (field.column(), id.map(SqlValue::Integer).unwrap_or(SqlValue::Null))
            } else {
                match coerce(raw, field.field_type()) {
                    Ok(v) => (field.column(), to_sql(&v)),
                    Err(message) => {
                        errors.push(FieldError::new(key.clone(), message));
                        continue;
                    }
                }
            }
        };

        if value == SqlValue::Null {
            conditions.push(format!("{} IS NULL", column));
        } else {
            conditions.push(format!("{} = ?", column));
            params.push(value);
        }
    }

    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }
    if conditions.is_empty() {
        return Err(Error::invalid_field(
            "criteria",
            "at least one of transaction_ids, a date range, or filters is required",
        ));
    }

    Ok(Criteria { conditions, params })
}

fn query_transactions(
    conn: &Connection,
    ty: TransactionType,
    query: &TransactionQuery,
    paginate: bool,
) -> Result<Vec<Transaction>> {
    let mut conditions = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(start) = query.start_date {
        conditions.push("date >= ?");
        params.push(Box::new(format_date(start)));
    }
    if let Some(end) = query.end_date {
        conditions.push("date <= ?");
        params.push(Box::new(format_date(end)));
    }
    if let Some(has_split) = query.has_split {
        conditions.push("has_split = ?");
        params.push(Box::new(has_split));
    }
    if let Some(mark) = query.mark {
        conditions.push("mark = ?");
        params.push(Box::new(mark));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let page = if paginate {
        params.push(Box::new(clamp_limit(query.limit)));
        params.push(Box::new(query.offset.unwrap_or(0).max(0)));
        "LIMIT ? OFFSET ?"
    } else {
        ""
    };

    let sql = format!(
        "SELECT {} FROM {}_generalized {} ORDER BY date DESC, id DESC {}",
        VIEW_COLUMNS,
        ty.table_name(),
        where_clause,
        page
    );

    let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(params_refs.as_slice(), row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(transactions)
}

fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

impl Database {
    /// Insert a validated transaction
    pub fn create_transaction(
        &self,
        ty: TransactionType,
        new: &NewTransaction,
    ) -> Result<Transaction> {
        self.with_transaction(|conn| {
            let category_id = resolve_ref_to_id(conn, ty, new.category.as_ref())?;
            let id = insert_transaction(conn, ty, new, category_id, None)?;
            require_transaction(conn, ty, id)
        })
    }

    /// Validate a JSON payload and insert it
    pub fn create_transaction_from_payload(
        &self,
        ty: TransactionType,
        payload: &Map<String, Value>,
    ) -> Result<Transaction> {
        let new = parse_new_transaction(payload)?;
        self.create_transaction(ty, &new)
    }

    pub fn get_transaction(&self, ty: TransactionType, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        fetch_transaction(&conn, ty, id)
    }

    /// List transactions, newest first
    pub fn list_transactions(
        &self,
        ty: TransactionType,
        query: &TransactionQuery,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        query_transactions(&conn, ty, query, true)
    }

    /// List transactions annotated with effective labels
    ///
    /// Label options are collected over every transaction matching the other
    /// criteria, before the `label` filter and paging are applied.
    pub fn list_labeled_transactions(
        &self,
        ty: TransactionType,
        query: &TransactionQuery,
        label: Option<&str>,
        config: &HouseholdConfig,
    ) -> Result<LabeledListing> {
        let conn = self.conn()?;
        let transactions = query_transactions(&conn, ty, query, false)?;
        let ids: Vec<i64> = transactions.iter().map(|t| t.id).collect();
        let allocations = fetch_allocation_labels(&conn, ty, &ids)?;
        let users = fetch_users(&conn, false)?;

        let mut listing = reconcile(transactions, &allocations, &users, &config.default_username);

        let offset = query.offset.unwrap_or(0).max(0) as usize;
        let limit = clamp_limit(query.limit) as usize;
        listing.transactions = listing
            .transactions
            .into_iter()
            .filter(|t| label.map_or(true, |f| matches_label(t.effective_label.as_deref(), f)))
            .skip(offset)
            .take(limit)
            .collect();

        Ok(listing)
    }

    /// Apply a partial update, skipping the write when nothing changes
    pub fn update_transaction(
        &self,
        ty: TransactionType,
        id: i64,
        payload: &Map<String, Value>,
    ) -> Result<UpdateOutcome> {
        let updates = parse_update(payload)?;

        self.with_transaction(|conn| {
            let current = require_transaction(conn, ty, id)?;

            let mut changed_fields = Vec::new();
            let mut assignments = Vec::new();
            let mut values: Vec<SqlValue> = Vec::new();

            for update in &updates {
                let field = update.field;
                let new_value = match &update.value {
                    FieldValue::Category(category) => {
                        match resolve_ref_to_id(conn, ty, category.as_ref())? {
                            Some(cid) => NormalizedValue::Number(cid as f64),
                            None => NormalizedValue::Absent,
                        }
                    }
                    FieldValue::Plain(v) => v.clone(),
                };
                let old_value = normalize(&stored_value(&current, field), field.field_type());

                if old_value == new_value {
                    continue;
                }

                let sql_value = match (&update.value, &new_value) {
                    (FieldValue::Category(_), NormalizedValue::Number(n)) => {
                        SqlValue::Integer(*n as i64)
                    }
                    _ => to_sql(&new_value),
                };
                changed_fields.push(field.name().to_string());
                assignments.push(format!("{} = ?", field.column()));
                values.push(sql_value);
            }

            if changed_fields.iter().any(|f| f == "amount") {
                ensure_unconfigured(conn, ty, id)?;
            }

            if assignments.is_empty() {
                debug!(transaction_id = id, domain = %ty, "Update is a no-op");
                return Ok(UpdateOutcome {
                    transaction: current,
                    changed_fields,
                    no_op: true,
                });
            }

            values.push(SqlValue::Integer(id));
            let sql = format!(
                "UPDATE {} SET {} WHERE id = ?",
                ty.table_name(),
                assignments.join(", ")
            );
            conn.execute(&sql, rusqlite::params_from_iter(values.iter()))
                .map_err(map_write_error)?;

            Ok(UpdateOutcome {
                transaction: require_transaction(conn, ty, id)?,
                changed_fields,
                no_op: false,
            })
        })
    }

    /// Set `mark` on every transaction matching the request's criteria
    pub fn bulk_mark(
        &self,
        ty: TransactionType,
        request: &BulkMarkRequest,
    ) -> Result<BulkMarkOutcome> {
        self.with_transaction(|conn| {
            let criteria = bulk_criteria(conn, ty, request)?;
            let where_clause = criteria.where_clause();

            let matched: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {}",
                    ty.table_name(),
                    where_clause
                ),
                rusqlite::params_from_iter(criteria.params.iter()),
                |row| row.get(0),
            )?;

            let mut params = criteria.params.clone();
            params.push(SqlValue::Integer(i64::from(request.mark)));
            let changing: i64 = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE {} AND mark != ?",
                    ty.table_name(),
                    where_clause
                ),
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;

            if changing == 0 {
                debug!(domain = %ty, matched, "Bulk mark is a no-op");
                return Ok(BulkMarkOutcome {
                    matched: matched as usize,
                    updated: 0,
                    no_op: true,
                });
            }

            let mut update_params = vec![SqlValue::Integer(i64::from(request.mark))];
            update_params.extend(params);
            let updated = conn.execute(
                &format!(
                    "UPDATE {} SET mark = ? WHERE {} AND mark != ?",
                    ty.table_name(),
                    where_clause
                ),
                rusqlite::params_from_iter(update_params.iter()),
            )?;

            info!(domain = %ty, matched, updated, mark = request.mark, "Bulk mark applied");
            Ok(BulkMarkOutcome {
                matched: matched as usize,
                updated,
                no_op: false,
            })
        })
    }

    /// Break one transaction into several rows that conserve its amount
    pub fn split_transaction(
        &self,
        ty: TransactionType,
        request: &AmountSplitRequest,
    ) -> Result<AmountSplitOutcome> {
        let mut errors = Vec::new();
        if request.split_transactions.is_empty() {
            errors.push(FieldError::new(
                "split_transactions",
                "at least one split transaction is required",
            ));
        }
        if !request.remaining_amount.is_finite() {
            errors.push(FieldError::new("remaining_amount", "must be a number"));
        }
        for (i, split) in request.split_transactions.iter().enumerate() {
            if split.description.trim().is_empty() {
                errors.push(FieldError::new(
                    format!("split_transactions[{}].description", i),
                    "is required",
                ));
            }
            if !split.amount.is_finite() || split.amount == 0.0 {
                errors.push(FieldError::new(
                    format!("split_transactions[{}].amount", i),
                    "must be a non-zero number",
                ));
            }
        }
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        self.with_transaction(|conn| {
            let original = require_transaction(conn, ty, request.original_transaction_id)?;
            ensure_unconfigured(conn, ty, original.id)?;

            let split_total: f64 = request.split_transactions.iter().map(|s| s.amount.abs()).sum();
            let accounted = split_total + request.remaining_amount.abs();
            if !within_tolerance(accounted, original.amount.abs()) {
                return Err(Error::invalid_field(
                    "split_transactions",
                    format!(
                        "split amounts ({:.2}) plus remaining amount ({:.2}) must equal the original amount ({:.2})",
                        round2(split_total),
                        round2(request.remaining_amount.abs()),
                        original.amount.abs()
                    ),
                ));
            }

            let sign = sign_of(original.amount);

            // Resolve everything before the first write
            let mut rows = Vec::with_capacity(request.split_transactions.len());
            for (i, split) in request.split_transactions.iter().enumerate() {
                let category_id = match &split.category {
                    Some(raw) => {
                        let category = category_ref(raw).map_err(|message| {
                            Error::invalid_field(
                                format!("split_transactions[{}].category", i),
                                message,
                            )
                        })?;
                        match category {
                            Some(c) => resolve_ref_to_id(conn, ty, Some(&c))?,
                            None => original.category_id,
                        }
                    }
                    None => original.category_id,
                };
                let new = NewTransaction {
                    id: None,
                    date: split.date.unwrap_or(original.date),
                    description: split.description.trim().to_string(),
                    amount: sign * split.amount.abs(),
                    category: None,
                    label: split.label.clone().or_else(|| original.label.clone()),
                    mark: false,
                    closing_balance: None,
                };
                rows.push((new, category_id));
            }

            let mut created_ids = Vec::with_capacity(rows.len());
            for (new, category_id) in &rows {
                created_ids.push(insert_transaction(conn, ty, new, *category_id, Some(original.id))?);
            }

            let remaining = if request.remaining_amount == 0.0 {
                0.0
            } else {
                sign * request.remaining_amount.abs()
            };
            conn.execute(
                &format!(
                    "UPDATE {} SET amount = ?, has_split = 1 WHERE id = ?",
                    ty.table_name()
                ),
                params![remaining, original.id],
            )?;

            info!(
                domain = %ty,
                transaction_id = original.id,
                parts = created_ids.len(),
                remaining,
                "Split transaction by amount"
            );

            let created = created_ids
                .into_iter()
                .map(|id| require_transaction(conn, ty, id))
                .collect::<Result<Vec<_>>>()?;

            Ok(AmountSplitOutcome {
                original: require_transaction(conn, ty, original.id)?,
                created,
            })
        })
    }

    /// Backfill legacy labels on unlabeled shared transactions
    ///
    /// Transactions with a split configuration are left alone. Returns the
    /// number of rows labelled.
    pub fn apply_auto_labels(&self, config: &HouseholdConfig) -> Result<usize> {
        let ty = TransactionType::Shared;
        self.with_transaction(|conn| {
            let sql = format!(
                r#"
                SELECT t.id, t.category
                FROM {}_generalized t
                WHERE t.label IS NULL
                  AND NOT EXISTS (
                      SELECT 1 FROM transaction_split_configs c
                      WHERE c.transaction_id = t.id AND c.transaction_type = ?
                  )
                "#,
                ty.table_name()
            );
            let mut stmt = conn.prepare(&sql)?;
            let candidates = stmt
                .query_map(params![ty.code()], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut labelled: HashMap<String, usize> = HashMap::new();
            let update_sql = format!("UPDATE {} SET label = ? WHERE id = ?", ty.table_name());
            for (id, category) in candidates {
                if let Some(label) = auto_label(category.as_deref(), config) {
                    conn.execute(&update_sql, params![label, id])?;
                    *labelled.entry(label).or_default() += 1;
                }
            }

            let total: usize = labelled.values().sum();
            info!(total, ?labelled, "Applied legacy auto-labels");
            Ok(total)
        })
    }
}
