//! Domain models for Hearth

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which transaction domain (and therefore which base table) a row lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Joint account shared between household members
    Shared,
    /// A single member's own account
    Personal,
    /// Mortgage offset account
    Offset,
}

impl TransactionType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Personal => "personal",
            Self::Offset => "offset",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Shared => "Shared",
            Self::Personal => "Personal",
            Self::Offset => "Offset",
        }
    }

    /// Base table holding this domain's transactions
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::Shared => "shared_transactions",
            Self::Personal => "personal_transactions",
            Self::Offset => "offset_transactions",
        }
    }

    /// Category lookup table for this domain
    pub fn category_table(&self) -> &'static str {
        match self {
            Self::Shared => "shared_categories",
            Self::Personal => "personal_categories",
            Self::Offset => "offset_categories",
        }
    }

    pub fn all() -> &'static [TransactionType] {
        &[Self::Shared, Self::Personal, Self::Offset]
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shared" => Ok(Self::Shared),
            "personal" => Ok(Self::Personal),
            "offset" => Ok(Self::Offset),
            _ => Err(format!("Unknown transaction type: {}", s)),
        }
    }
}

/// A row of the transaction type directory
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionTypeInfo {
    pub code: String,
    pub label: String,
    pub table_name: String,
}

impl From<TransactionType> for TransactionTypeInfo {
    fn from(ty: TransactionType) -> Self {
        Self {
            code: ty.code().to_string(),
            label: ty.label().to_string(),
            table_name: ty.table_name().to_string(),
        }
    }
}

/// Strategy for dividing a transaction among users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitType {
    /// Everyone pays the same share
    Equal,
    /// Each user supplies a percentage
    Percentage,
    /// Each user supplies an amount
    Fixed,
}

impl SplitType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::Percentage => "percentage",
            Self::Fixed => "fixed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Equal => "Equal split",
            Self::Percentage => "Percentage split",
            Self::Fixed => "Fixed amounts",
        }
    }

    pub fn all() -> &'static [SplitType] {
        &[Self::Equal, Self::Percentage, Self::Fixed]
    }
}

impl std::str::FromStr for SplitType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal" => Ok(Self::Equal),
            "percentage" => Ok(Self::Percentage),
            "fixed" => Ok(Self::Fixed),
            _ => Err(Error::UnsupportedSplitType(s.to_string())),
        }
    }
}

/// Directory entry for a split type (code + label)
#[derive(Debug, Clone, Serialize)]
pub struct SplitTypeInfo {
    pub code: &'static str,
    pub label: &'static str,
}

impl From<SplitType> for SplitTypeInfo {
    fn from(ty: SplitType) -> Self {
        Self {
            code: ty.code(),
            label: ty.label(),
        }
    }
}

/// A household member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub is_active: bool,
}

/// A category row from one of the per-domain lookup tables
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub category: String,
}

/// A financial transaction, read through the domain's generalized view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    /// Negative = debit, positive = credit
    pub amount: f64,
    pub category_id: Option<i64>,
    /// Category name resolved from `category_id`
    pub category: Option<String>,
    /// Legacy multi-user marker ("Both", a display name, or absent)
    pub label: Option<String>,
    pub mark: bool,
    /// True once amount-split offshoots have been created from this row
    pub has_split: bool,
    pub split_from_id: Option<i64>,
    pub closing_balance: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A validated transaction ready for insertion
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    /// Externally supplied id (e.g. from a bank feed); generated when absent
    pub id: Option<i64>,
    pub date: NaiveDate,
    pub description: String,
    pub amount: f64,
    pub category: Option<CategoryRef>,
    pub label: Option<String>,
    pub mark: bool,
    pub closing_balance: Option<f64>,
}

/// A category given either by id or by name
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryRef {
    Id(i64),
    Name(String),
}

/// Filters for listing transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub has_split: Option<bool>,
    pub mark: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Outcome of an update request
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub transaction: Transaction,
    /// Fields whose stored value changed
    pub changed_fields: Vec<String>,
    /// True when nothing differed and no write was issued
    pub no_op: bool,
}

/// Request to set `mark` across a filtered set of transactions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BulkMarkRequest {
    #[serde(default)]
    pub transaction_ids: Option<Vec<i64>>,
    #[serde(default, alias = "date_from")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "date_to")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub filters: serde_json::Map<String, serde_json::Value>,
    pub mark: bool,
}

/// Outcome of a bulk mark update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkMarkOutcome {
    /// Rows matching the criteria
    pub matched: usize,
    /// Rows whose mark actually changed
    pub updated: usize,
    pub no_op: bool,
}

/// Request to break one transaction into several rows
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountSplitRequest {
    #[serde(alias = "original_transaction_id")]
    pub original_transaction_id: i64,
    #[serde(default, alias = "remaining_amount")]
    pub remaining_amount: f64,
    #[serde(alias = "split_transactions")]
    pub split_transactions: Vec<SplitOffTransaction>,
}

/// One new row carved out of an amount split
#[derive(Debug, Clone, Deserialize)]
pub struct SplitOffTransaction {
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<serde_json::Value>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

/// Result of an amount split
#[derive(Debug, Clone, Serialize)]
pub struct AmountSplitOutcome {
    pub original: Transaction,
    pub created: Vec<Transaction>,
}

/// Per-user input to the allocation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationInput {
    pub user_id: i64,
    #[serde(default)]
    pub percentage: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
}

/// Allocation computed by the engine, before persistence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputedAllocation {
    pub user_id: i64,
    /// Same sign as the parent transaction
    pub amount: f64,
    pub percentage: f64,
}

/// Explicit split configuration for one transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitConfig {
    pub id: i64,
    pub transaction_id: i64,
    pub transaction_type: TransactionType,
    pub split_type: SplitType,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted per-user allocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SplitAllocation {
    pub id: i64,
    pub config_id: i64,
    pub user_id: i64,
    pub display_name: String,
    pub amount: f64,
    pub percentage: f64,
    pub is_paid: bool,
    pub paid_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Allocation synthesized from a legacy label, never persisted
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedAllocation {
    pub user_id: i64,
    pub display_name: String,
    pub amount: f64,
    pub percentage: f64,
}

/// How a transaction's allocations are known
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SplitView {
    /// A configuration row exists
    Explicit {
        config: SplitConfig,
        allocations: Vec<SplitAllocation>,
    },
    /// Derived from the transaction's legacy label
    Legacy {
        label: String,
        allocations: Vec<DerivedAllocation>,
    },
    /// Neither a configuration nor a usable label
    Unallocated,
}

impl SplitView {
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy { .. })
    }

    /// Number of users sharing the transaction
    pub fn allocation_count(&self) -> usize {
        match self {
            Self::Explicit { allocations, .. } => allocations.len(),
            Self::Legacy { allocations, .. } => allocations.len(),
            Self::Unallocated => 0,
        }
    }
}

/// A transaction together with its allocation view
#[derive(Debug, Clone, Serialize)]
pub struct SplitDetails {
    pub transaction: Transaction,
    #[serde(flatten)]
    pub view: SplitView,
    pub legacy_mode: bool,
}

impl SplitDetails {
    pub fn new(transaction: Transaction, view: SplitView) -> Self {
        let legacy_mode = view.is_legacy();
        Self {
            transaction,
            view,
            legacy_mode,
        }
    }
}

/// Outcome of a split configuration update
#[derive(Debug, Clone, Serialize)]
pub struct SplitUpdateOutcome {
    #[serde(flatten)]
    pub details: SplitDetails,
    /// True when the recomputed allocations matched and no write was issued
    pub no_op: bool,
}

/// Change to an allocation's payment status
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentUpdate {
    pub is_paid: Option<bool>,
    /// `YYYY-MM-DD` (midnight UTC) or an RFC 3339 timestamp
    #[serde(default, deserialize_with = "date_or_datetime::deserialize")]
    pub paid_date: Option<DateTime<Utc>>,
    /// `Some(None)` clears the notes
    #[serde(default, with = "double_option")]
    pub notes: Option<Option<String>>,
}

/// Append-only record of a deleted split configuration
#[derive(Debug, Clone, Serialize)]
pub struct SplitAudit {
    pub id: i64,
    pub config_id: i64,
    pub transaction_id: i64,
    pub transaction_type: TransactionType,
    pub action: String,
    /// Prior config, allocations and owning transaction
    pub snapshot: serde_json::Value,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
}

/// An allocation as seen by label reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AllocationLabel {
    pub user_id: i64,
    pub split_type: SplitType,
}

/// Per-user totals across allocations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserBalance {
    pub user_id: i64,
    pub display_name: String,
    /// Sum of allocated amounts (signed)
    pub allocated: f64,
    pub paid: f64,
    pub outstanding: f64,
    pub allocation_count: usize,
}

mod date_or_datetime {
    use chrono::{DateTime, NaiveDate, Utc};
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(dt.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Some(dt.and_utc()))
            .ok_or_else(|| D::Error::custom(format!("invalid paid_date '{}'", raw)))
    }
}

/// Distinguishes a missing field from an explicit null
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
