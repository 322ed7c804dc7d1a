//! Legacy label compatibility
//!
//! Shared transactions recorded before split configurations existed carry a
//! static `label`: `"Both"`, one member's display name, or nothing. When no
//! configuration row exists these labels are turned into a read-only
//! allocation view so consumers see one shape regardless of data age.

use tracing::warn;

use crate::allocation::round2;
use crate::household::HouseholdConfig;
use crate::labels::LABEL_BOTH;
use crate::models::{DerivedAllocation, SplitView, Transaction, User};

fn find_member<'a>(users: &'a [User], display_name: &str, default_username: &str) -> Option<&'a User> {
    users.iter().find(|u| {
        u.is_active
            && u.username != default_username
            && u.display_name.eq_ignore_ascii_case(display_name.trim())
    })
}

/// Synthesize allocations for a shared transaction that has no configuration
pub fn derive_legacy_view(tx: &Transaction, users: &[User], config: &HouseholdConfig) -> SplitView {
    let label = match tx.label.as_deref().map(str::trim) {
        Some(l) if !l.is_empty() => l,
        _ => return SplitView::Unallocated,
    };

    if label.eq_ignore_ascii_case(LABEL_BOTH) {
        let Some((first, second)) = config.legacy_pair() else {
            warn!(transaction_id = tx.id, "\"Both\" label but no legacy members configured");
            return SplitView::Unallocated;
        };
        let members = (
            find_member(users, first, &config.default_username),
            find_member(users, second, &config.default_username),
        );
        let (Some(a), Some(b)) = members else {
            warn!(
                transaction_id = tx.id,
                first, second, "legacy members for \"Both\" are not active users"
            );
            return SplitView::Unallocated;
        };

        let sign = if tx.amount < 0.0 { -1.0 } else { 1.0 };
        let half = sign * round2(tx.amount.abs() / 2.0);
        let allocations = [a, b]
            .into_iter()
            .map(|u| DerivedAllocation {
                user_id: u.id,
                display_name: u.display_name.clone(),
                amount: half,
                percentage: 50.0,
            })
            .collect();

        return SplitView::Legacy {
            label: LABEL_BOTH.to_string(),
            allocations,
        };
    }

    match find_member(users, label, &config.default_username) {
        Some(user) => SplitView::Legacy {
            label: user.display_name.clone(),
            allocations: vec![DerivedAllocation {
                user_id: user.id,
                display_name: user.display_name.clone(),
                amount: tx.amount,
                percentage: 100.0,
            }],
        },
        None => SplitView::Unallocated,
    }
}

/// Legacy label for a bank category
///
/// Unlabeled categories (and no category at all) give `None`, personal
/// categories go to the first legacy member, everything else is `"Both"`.
pub fn auto_label(bank_category: Option<&str>, config: &HouseholdConfig) -> Option<String> {
    let category = bank_category.map(str::trim).filter(|c| !c.is_empty())?;
    let rules = &config.auto_label;

    if rules
        .unlabeled_categories
        .iter()
        .any(|c| c.eq_ignore_ascii_case(category))
    {
        return None;
    }

    if rules
        .primary_member_categories
        .iter()
        .any(|c| c.eq_ignore_ascii_case(category))
    {
        return config.legacy_members.first().cloned();
    }

    Some(LABEL_BOTH.to_string())
}
