//! Per-domain category tables
//!
//! Payloads carry categories either as names (from pickers) or as ids (from
//! round-tripped responses). Resolution accepts both without the caller
//! having to say which it has.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use super::Database;
use crate::error::{Error, Result};
use crate::models::{Category, CategoryRef, TransactionType};
use crate::mutation::category_ref;

/// Resolve a category reference to an id
///
/// Ids pass through unchecked (the foreign key enforces existence); names
/// must match a row exactly.
pub(crate) fn resolve_ref_to_id(
    conn: &Connection,
    ty: TransactionType,
    category: Option<&CategoryRef>,
) -> Result<Option<i64>> {
    match category {
        None => Ok(None),
        Some(CategoryRef::Id(id)) => Ok(Some(*id)),
        Some(CategoryRef::Name(name)) => {
            let sql = format!("SELECT id FROM {} WHERE category = ?", ty.category_table());
            conn.query_row(&sql, params![name], |row| row.get(0))
                .optional()?
                .map(Some)
                .ok_or_else(|| Error::CategoryNotFound {
                    value: name.clone(),
                    table: ty.category_table().to_string(),
                })
        }
    }
}

/// Resolve a category reference to a name
///
/// Names pass through unchanged; ids must exist.
pub(crate) fn resolve_ref_to_name(
    conn: &Connection,
    ty: TransactionType,
    category: Option<&CategoryRef>,
) -> Result<Option<String>> {
    match category {
        None => Ok(None),
        Some(CategoryRef::Name(name)) => Ok(Some(name.clone())),
        Some(CategoryRef::Id(id)) => {
            let sql = format!("SELECT category FROM {} WHERE id = ?", ty.category_table());
            conn.query_row(&sql, params![id], |row| row.get(0))
                .optional()?
                .map(Some)
                .ok_or_else(|| Error::CategoryNotFound {
                    value: id.to_string(),
                    table: ty.category_table().to_string(),
                })
        }
    }
}

fn parse_raw(raw: &Value) -> Result<Option<CategoryRef>> {
    category_ref(raw).map_err(|message| Error::invalid_field("category", message))
}

impl Database {
    /// Resolve a raw name-or-id value to a category id
    pub fn resolve_category_id(&self, ty: TransactionType, raw: &Value) -> Result<Option<i64>> {
        let category = parse_raw(raw)?;
        let conn = self.conn()?;
        resolve_ref_to_id(&conn, ty, category.as_ref())
    }

    /// Resolve a raw name-or-id value to a category name
    pub fn resolve_category_name(
        &self,
        ty: TransactionType,
        raw: &Value,
    ) -> Result<Option<String>> {
        let category = parse_raw(raw)?;
        let conn = self.conn()?;
        resolve_ref_to_name(&conn, ty, category.as_ref())
    }

    pub fn list_categories(&self, ty: TransactionType) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT id, category FROM {} ORDER BY category COLLATE NOCASE",
            ty.category_table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let categories = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    category: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Create a category, or return the existing one with the same name
    pub fn create_category(&self, ty: TransactionType, name: &str) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::invalid_field("category", "is required"));
        }
        if name.parse::<i64>().is_ok() {
            return Err(Error::invalid_field(
                "category",
                "a category name cannot be a number",
            ));
        }

        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT OR IGNORE INTO {} (category) VALUES (?)",
                ty.category_table()
            ),
            params![name],
        )?;
        let id: i64 = conn.query_row(
            &format!("SELECT id FROM {} WHERE category = ?", ty.category_table()),
            params![name],
            |row| row.get(0),
        )?;

        Ok(Category {
            id,
            category: name.to_string(),
        })
    }
}
