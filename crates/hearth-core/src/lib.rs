//! Hearth Core Library
//!
//! Shared functionality for the Hearth household finance tracker:
//! - Database access and migrations for the shared, personal and offset domains
//! - Payload validation and value normalization for transaction edits
//! - Amount splits that break one transaction into several rows
//! - The allocation engine dividing a transaction among household members
//! - Legacy label fallback and label reconciliation
//! - Household configuration (legacy members, auto-label rules)

pub mod allocation;
pub mod db;
pub mod error;
pub mod household;
pub mod labels;
pub mod legacy;
pub mod models;
pub mod mutation;
pub mod normalize;

pub use db::{AuditEntry, Database, SplitRequest};
pub use error::{Error, FieldError, Result};
pub use household::{AutoLabelRules, HouseholdConfig};
pub use labels::{LabeledListing, LabeledTransaction, LABEL_ALL_USERS, LABEL_BOTH};
pub use models::{SplitType, TransactionType};
