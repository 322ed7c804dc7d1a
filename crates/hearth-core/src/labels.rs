//! Label reconciliation
//!
//! Works out which label a transaction effectively carries, preferring its
//! allocations over the static legacy `label`, and enumerates the label
//! options a filter UI should offer.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::{AllocationLabel, SplitType, Transaction, User};

pub const LABEL_BOTH: &str = "Both";
pub const LABEL_ALL_USERS: &str = "All users";

/// A transaction annotated with its effective label
#[derive(Debug, Clone, Serialize)]
pub struct LabeledTransaction {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub effective_label: Option<String>,
}

/// Listing result with the label options present in it
#[derive(Debug, Clone, Serialize)]
pub struct LabeledListing {
    pub transactions: Vec<LabeledTransaction>,
    pub label_options: Vec<Option<String>>,
}

/// Label implied by a transaction's allocations, falling back to its static label
pub fn effective_label(
    static_label: Option<&str>,
    allocations: &[AllocationLabel],
    users: &[User],
    default_username: &str,
) -> Option<String> {
    let default_ids: Vec<i64> = users
        .iter()
        .filter(|u| u.username == default_username)
        .map(|u| u.id)
        .collect();
    let counted: Vec<&AllocationLabel> = allocations
        .iter()
        .filter(|a| !default_ids.contains(&a.user_id))
        .collect();

    if counted.is_empty() {
        return static_label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from);
    }

    let all_equal = counted.iter().all(|a| a.split_type == SplitType::Equal);
    match counted.len() {
        1 => users
            .iter()
            .find(|u| u.id == counted[0].user_id)
            .map(|u| u.display_name.clone()),
        2 if all_equal => Some(LABEL_BOTH.to_string()),
        n if n >= 3 && all_equal => Some(LABEL_ALL_USERS.to_string()),
        _ => None,
    }
}

/// Annotate transactions and collect the label options across them
pub fn reconcile(
    transactions: Vec<Transaction>,
    allocations: &HashMap<i64, Vec<AllocationLabel>>,
    users: &[User],
    default_username: &str,
) -> LabeledListing {
    let transactions: Vec<LabeledTransaction> = transactions
        .into_iter()
        .map(|tx| {
            let allocs = allocations.get(&tx.id).map(Vec::as_slice).unwrap_or(&[]);
            let effective_label =
                effective_label(tx.label.as_deref(), allocs, users, default_username);
            LabeledTransaction {
                transaction: tx,
                effective_label,
            }
        })
        .collect();

    let effective: Vec<Option<&str>> = transactions
        .iter()
        .map(|t| t.effective_label.as_deref())
        .collect();
    let label_options = label_options(users, default_username, &effective);

    LabeledListing {
        transactions,
        label_options,
    }
}

/// Filter options: members alphabetically, then "Both", "All users", and `None`
pub fn label_options(
    users: &[User],
    default_username: &str,
    effective_labels: &[Option<&str>],
) -> Vec<Option<String>> {
    let mut names: Vec<String> = users
        .iter()
        .filter(|u| u.is_active && u.username != default_username)
        .map(|u| u.display_name.clone())
        .collect();
    names.sort_by_key(|n| n.to_lowercase());
    names.dedup();

    let mut options: Vec<Option<String>> = names.into_iter().map(Some).collect();

    if effective_labels.iter().any(|l| *l == Some(LABEL_BOTH)) {
        options.push(Some(LABEL_BOTH.to_string()));
    }
    if effective_labels.iter().any(|l| *l == Some(LABEL_ALL_USERS)) {
        options.push(Some(LABEL_ALL_USERS.to_string()));
    }
    if effective_labels.iter().any(Option::is_none) {
        options.push(None);
    }

    options
}

/// Whether an effective label satisfies a `label` filter value
///
/// `"null"`, `"none"` and the empty string select unallocated transactions.
pub fn matches_label(effective: Option<&str>, filter: &str) -> bool {
    let filter = filter.trim();
    if filter.is_empty() || filter.eq_ignore_ascii_case("null") || filter.eq_ignore_ascii_case("none")
    {
        return effective.is_none();
    }
    effective.is_some_and(|l| l.eq_ignore_ascii_case(filter))
}
