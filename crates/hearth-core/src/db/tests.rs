//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::household::HouseholdConfig;
    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    struct Household {
        db: Database,
        config: HouseholdConfig,
        ruby: User,
        jack: User,
        ava: User,
    }

    fn household() -> Household {
        let db = Database::in_memory().unwrap();
        let ruby = db.create_user("ruby", "Ruby").unwrap();
        let jack = db.create_user("jack", "Jack").unwrap();
        let ava = db.create_user("ava", "Ava").unwrap();
        Household {
            db,
            config: HouseholdConfig::default(),
            ruby,
            jack,
            ava,
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn add_tx(db: &Database, ty: TransactionType, amount: f64, label: Option<&str>) -> Transaction {
        db.create_transaction_from_payload(
            ty,
            &obj(json!({
                "date": "2024-03-10",
                "description": "Test transaction",
                "amount": amount,
                "label": label,
            })),
        )
        .unwrap()
    }

    fn input(user: &User) -> AllocationInput {
        AllocationInput {
            user_id: user.id,
            percentage: None,
            amount: None,
        }
    }

    fn request(split_type: &str, users: Vec<AllocationInput>) -> SplitRequest {
        SplitRequest {
            split_type: Some(split_type.to_string()),
            users,
            created_by: Some("tester".to_string()),
        }
    }

    #[test]
    fn test_schema_seeds_directory_and_default_user() {
        let db = Database::in_memory().unwrap();
        db.verify_transaction_types().unwrap();

        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "default");
        assert!(users[0].is_active);

        let conn = db.conn().unwrap();
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transaction_types WHERE table_name IN \
                 ('shared_transactions', 'personal_transactions', 'offset_transactions')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
    }

    #[test]
    fn test_directory_mismatch_fails_verification() {
        let db = Database::in_memory().unwrap();
        db.conn()
            .unwrap()
            .execute(
                "UPDATE transaction_types SET table_name = 'other' WHERE code = 'offset'",
                [],
            )
            .unwrap();
        assert!(matches!(db.verify_transaction_types(), Err(Error::Config(_))));
    }

    #[test]
    fn test_user_management() {
        let h = household();
        assert!(matches!(
            h.db.create_user("ruby", "Ruby Again"),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(h.db.create_user(" ", ""), Err(Error::Validation(_))));

        let deactivated = h.db.deactivate_user(h.ava.id).unwrap();
        assert!(!deactivated.is_active);
        assert_eq!(h.db.active_users().unwrap().len(), 3);
        assert!(matches!(h.db.deactivate_user(999), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_category_resolution_round_trip() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let groceries = db.create_category(ty, "Groceries").unwrap();

        let id = db.resolve_category_id(ty, &json!("Groceries")).unwrap();
        assert_eq!(id, Some(groceries.id));
        let name = db.resolve_category_name(ty, &json!(id)).unwrap();
        assert_eq!(name.as_deref(), Some("Groceries"));

        // ids pass through, names pass through
        assert_eq!(db.resolve_category_id(ty, &json!(42)).unwrap(), Some(42));
        assert_eq!(db.resolve_category_id(ty, &json!("42")).unwrap(), Some(42));
        assert_eq!(
            db.resolve_category_name(ty, &json!("Anything")).unwrap().as_deref(),
            Some("Anything")
        );

        assert_eq!(db.resolve_category_id(ty, &Value::Null).unwrap(), None);
        assert_eq!(db.resolve_category_id(ty, &json!("")).unwrap(), None);

        match db.resolve_category_id(ty, &json!("Unknown")) {
            Err(Error::CategoryNotFound { value, table }) => {
                assert_eq!(value, "Unknown");
                assert_eq!(table, "shared_categories");
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            db.resolve_category_name(ty, &json!(999)),
            Err(Error::CategoryNotFound { .. })
        ));
    }

    #[test]
    fn test_categories_are_per_domain() {
        let db = Database::in_memory().unwrap();
        db.create_category(TransactionType::Personal, "Gym").unwrap();
        let again = db.create_category(TransactionType::Personal, "Gym").unwrap();

        assert_eq!(db.list_categories(TransactionType::Personal).unwrap().len(), 1);
        assert_eq!(again.category, "Gym");
        assert!(db.list_categories(TransactionType::Shared).unwrap().is_empty());
        assert!(matches!(
            db.create_category(TransactionType::Personal, "123"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_create_transaction_resolves_category() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let fuel = db.create_category(ty, "Fuel").unwrap();

        let tx = db
            .create_transaction_from_payload(
                ty,
                &obj(json!({
                    "date": "2024-01-15",
                    "description": "Servo",
                    "amount": "-65.10",
                    "bank_category": "Fuel",
                })),
            )
            .unwrap();

        assert_eq!(tx.category_id, Some(fuel.id));
        assert_eq!(tx.category.as_deref(), Some("Fuel"));
        assert_eq!(tx.amount, -65.1);
        assert!(!tx.has_split);
        assert!(!tx.mark);
    }

    #[test]
    fn test_create_transaction_validation_is_all_or_nothing() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Personal;

        let err = db
            .create_transaction_from_payload(
                ty,
                &obj(json!({"date": "2024-13-01", "amount": "x"})),
            )
            .unwrap_err();
        assert_eq!(err.field_errors().len(), 3);

        let err = db
            .create_transaction_from_payload(
                ty,
                &obj(json!({
                    "date": "2024-01-01",
                    "description": "Bad category",
                    "amount": 5,
                    "category": 77,
                })),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(db
            .list_transactions(ty, &TransactionQuery::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_create_transaction_with_external_id() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Offset;
        let payload = obj(json!({
            "id": 5001,
            "date": "2024-01-01",
            "description": "Interest",
            "amount": 12.5,
            "closing_balance": "10500.25",
        }));

        let tx = db.create_transaction_from_payload(ty, &payload).unwrap();
        assert_eq!(tx.id, 5001);
        assert_eq!(tx.closing_balance, Some(10500.25));
        assert!(matches!(
            db.create_transaction_from_payload(ty, &payload),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_update_is_noop_when_values_match() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        db.create_category(ty, "Groceries").unwrap();
        let tx = db
            .create_transaction_from_payload(
                ty,
                &obj(json!({
                    "date": "2024-02-01",
                    "description": "Woolworths",
                    "amount": -45.2,
                    "category": "Groceries",
                    "label": "Both",
                })),
            )
            .unwrap();

        let outcome = db
            .update_transaction(
                ty,
                tx.id,
                &obj(json!({
                    "date": "2024-02-01T00:00:00Z",
                    "description": " Woolworths ",
                    "amount": "-45.20",
                    "category": tx.category_id,
                    "bank_category": "Groceries",
                    "label": "Both",
                    "mark": "false",
                    "has_split": true,
                })),
            )
            .unwrap();

        assert!(outcome.no_op);
        assert!(outcome.changed_fields.is_empty());
        assert_eq!(outcome.transaction, tx);
    }

    #[test]
    fn test_update_writes_changed_fields() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let tx = add_tx(&db, ty, -20.0, Some("Both"));

        let outcome = db
            .update_transaction(
                ty,
                tx.id,
                &obj(json!({"label": null, "mark": true, "amount": -20})),
            )
            .unwrap();

        assert!(!outcome.no_op);
        let mut changed = outcome.changed_fields.clone();
        changed.sort();
        assert_eq!(changed, vec!["label", "mark"]);
        assert_eq!(outcome.transaction.label, None);
        assert!(outcome.transaction.mark);

        assert!(matches!(
            db.update_transaction(ty, 9999, &obj(json!({"mark": true}))),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.update_transaction(ty, tx.id, &obj(json!({"category": "Missing"}))),
            Err(Error::CategoryNotFound { .. })
        ));
    }

    #[test]
    fn test_bulk_mark_requires_criteria() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let tx = add_tx(&db, ty, -10.0, None);

        let empty = BulkMarkRequest {
            mark: true,
            ..Default::default()
        };
        assert!(matches!(db.bulk_mark(ty, &empty), Err(Error::Validation(_))));

        let empty_ids = BulkMarkRequest {
            transaction_ids: Some(vec![]),
            mark: true,
            ..Default::default()
        };
        assert!(matches!(db.bulk_mark(ty, &empty_ids), Err(Error::Validation(_))));

        assert!(!db.get_transaction(ty, tx.id).unwrap().unwrap().mark);
    }

    #[test]
    fn test_bulk_mark_reports_noop() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let a = add_tx(&db, ty, -10.0, Some("Both"));
        let b = add_tx(&db, ty, -15.0, Some("Ruby"));
        add_tx(&db, ty, -5.0, Some("Both"));

        let by_ids = BulkMarkRequest {
            transaction_ids: Some(vec![a.id, b.id]),
            mark: true,
            ..Default::default()
        };
        let outcome = db.bulk_mark(ty, &by_ids).unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.updated, 2);
        assert!(!outcome.no_op);

        let again = db.bulk_mark(ty, &by_ids).unwrap();
        assert!(again.no_op);
        assert_eq!(again.updated, 0);

        let mut filters = Map::new();
        filters.insert("label".to_string(), json!("Both"));
        let by_label = BulkMarkRequest {
            filters,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            mark: true,
            ..Default::default()
        };
        let outcome = db.bulk_mark(ty, &by_label).unwrap();
        assert_eq!(outcome.matched, 2);
        assert_eq!(outcome.updated, 1);

        let mut bad = Map::new();
        bad.insert("colour".to_string(), json!("red"));
        let bad_filter = BulkMarkRequest {
            filters: bad,
            mark: false,
            ..Default::default()
        };
        assert!(matches!(db.bulk_mark(ty, &bad_filter), Err(Error::Validation(_))));
    }

    #[test]
    fn test_amount_split_conserves_total() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        db.create_category(ty, "Household").unwrap();
        let original = add_tx(&db, ty, 100.0, Some("Both"));

        let request = AmountSplitRequest {
            original_transaction_id: original.id,
            remaining_amount: 25.0,
            split_transactions: vec![
                SplitOffTransaction {
                    description: "Part one".into(),
                    amount: 40.0,
                    category: Some(json!("Household")),
                    label: None,
                    date: None,
                },
                SplitOffTransaction {
                    description: "Part two".into(),
                    amount: -35.0,
                    category: None,
                    label: Some("Ruby".into()),
                    date: None,
                },
            ],
        };

        let outcome = db.split_transaction(ty, &request).unwrap();
        assert_eq!(outcome.original.amount, 25.0);
        assert!(outcome.original.has_split);
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.created[0].amount, 40.0);
        assert_eq!(outcome.created[1].amount, 35.0);
        assert!(outcome
            .created
            .iter()
            .all(|t| t.split_from_id == Some(original.id) && t.date == original.date));
        assert_eq!(outcome.created[0].category.as_deref(), Some("Household"));
        assert_eq!(outcome.created[0].label.as_deref(), Some("Both"));
        assert_eq!(outcome.created[1].label.as_deref(), Some("Ruby"));

        let total: f64 = outcome.original.amount + outcome.created.iter().map(|t| t.amount).sum::<f64>();
        assert!((total - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_amount_split_keeps_debit_sign() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Personal;
        let original = add_tx(&db, ty, -60.0, None);

        let request = AmountSplitRequest {
            original_transaction_id: original.id,
            remaining_amount: 0.0,
            split_transactions: vec![
                SplitOffTransaction {
                    description: "Half".into(),
                    amount: 30.0,
                    category: None,
                    label: None,
                    date: NaiveDate::from_ymd_opt(2024, 3, 11),
                },
                SplitOffTransaction {
                    description: "Other half".into(),
                    amount: 30.0,
                    category: None,
                    label: None,
                    date: None,
                },
            ],
        };

        let outcome = db.split_transaction(ty, &request).unwrap();
        assert_eq!(outcome.original.amount, 0.0);
        assert!(outcome.created.iter().all(|t| t.amount == -30.0));
        assert_eq!(
            outcome.created[0].date,
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }

    #[test]
    fn test_amount_split_mismatch_writes_nothing() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        let original = add_tx(&db, ty, -100.0, None);

        let request = AmountSplitRequest {
            original_transaction_id: original.id,
            remaining_amount: 10.0,
            split_transactions: vec![SplitOffTransaction {
                description: "Too small".into(),
                amount: 50.0,
                category: None,
                label: None,
                date: None,
            }],
        };
        assert!(matches!(
            db.split_transaction(ty, &request),
            Err(Error::Validation(_))
        ));

        let unknown_category = AmountSplitRequest {
            original_transaction_id: original.id,
            remaining_amount: 0.0,
            split_transactions: vec![SplitOffTransaction {
                description: "Whole".into(),
                amount: 100.0,
                category: Some(json!("Nope")),
                label: None,
                date: None,
            }],
        };
        assert!(matches!(
            db.split_transaction(ty, &unknown_category),
            Err(Error::CategoryNotFound { .. })
        ));

        let all = db.list_transactions(ty, &TransactionQuery::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].amount, -100.0);
        assert!(!all[0].has_split);
    }

    #[test]
    fn test_create_equal_split() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -90.0, None);

        let details = h
            .db
            .create_split_config(
                ty,
                tx.id,
                &request("equal", vec![input(&h.ruby), input(&h.jack), input(&h.ava)]),
                &h.config,
            )
            .unwrap();

        assert!(!details.legacy_mode);
        match details.view {
            SplitView::Explicit {
                config,
                allocations,
            } => {
                assert_eq!(config.split_type, SplitType::Equal);
                assert_eq!(config.created_by.as_deref(), Some("tester"));
                assert_eq!(allocations.len(), 3);
                assert!(allocations.iter().all(|a| a.amount == -30.0 && !a.is_paid));
                let percentages: Vec<f64> = allocations.iter().map(|a| a.percentage).collect();
                assert_eq!(percentages, vec![33.33, 33.33, 33.34]);
                assert_eq!(allocations[0].display_name, "Ruby");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_second_config_is_conflict() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -50.0, None);
        let req = request("equal", vec![input(&h.ruby), input(&h.jack)]);

        h.db.create_split_config(ty, tx.id, &req, &h.config).unwrap();
        assert!(matches!(
            h.db.create_split_config(ty, tx.id, &req, &h.config),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_create_split_rejections_leave_no_rows() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -100.0, None);

        let fixed = request(
            "fixed",
            vec![
                AllocationInput {
                    user_id: h.ruby.id,
                    percentage: None,
                    amount: Some(40.0),
                },
                AllocationInput {
                    user_id: h.jack.id,
                    percentage: None,
                    amount: Some(50.0),
                },
            ],
        );
        assert!(matches!(
            h.db.create_split_config(ty, tx.id, &fixed, &h.config),
            Err(Error::Reconciliation { .. })
        ));

        assert!(matches!(
            h.db.create_split_config(ty, tx.id, &request("weighted", vec![input(&h.ruby)]), &h.config),
            Err(Error::UnsupportedSplitType(_))
        ));
        assert!(matches!(
            h.db.create_split_config(ty, tx.id, &request("equal", vec![]), &h.config),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            h.db.create_split_config(ty, 999, &request("equal", vec![input(&h.ruby)]), &h.config),
            Err(Error::NotFound(_))
        ));

        let default_user = h
            .db
            .list_users()
            .unwrap()
            .into_iter()
            .find(|u| u.username == "default")
            .unwrap();
        assert!(matches!(
            h.db.create_split_config(
                ty,
                tx.id,
                &request("equal", vec![input(&h.ruby), input(&default_user)]),
                &h.config
            ),
            Err(Error::Validation(_))
        ));

        h.db.deactivate_user(h.ava.id).unwrap();
        assert!(matches!(
            h.db.create_split_config(ty, tx.id, &request("equal", vec![input(&h.ava)]), &h.config),
            Err(Error::Validation(_))
        ));

        let conn = h.db.conn().unwrap();
        let configs: i64 = conn
            .query_row("SELECT COUNT(*) FROM transaction_split_configs", [], |row| row.get(0))
            .unwrap();
        let allocations: i64 = conn
            .query_row("SELECT COUNT(*) FROM transaction_split_allocations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!((configs, allocations), (0, 0));
    }

    #[test]
    fn test_update_split_replaces_allocations() {
        let h = household();
        let ty = TransactionType::Personal;
        let tx = add_tx(&h.db, ty, -200.0, None);

        h.db.create_split_config(
            ty,
            tx.id,
            &request("equal", vec![input(&h.ruby), input(&h.jack)]),
            &h.config,
        )
        .unwrap();

        let update = SplitRequest {
            split_type: Some("percentage".into()),
            users: vec![
                AllocationInput {
                    user_id: h.ruby.id,
                    percentage: Some(70.0),
                    amount: None,
                },
                AllocationInput {
                    user_id: h.ava.id,
                    percentage: Some(30.0),
                    amount: None,
                },
            ],
            created_by: None,
        };
        let outcome = h.db.update_split_config(ty, tx.id, &update, &h.config).unwrap();
        assert!(!outcome.no_op);

        match outcome.details.view {
            SplitView::Explicit {
                config,
                allocations,
            } => {
                assert_eq!(config.split_type, SplitType::Percentage);
                let amounts: Vec<(i64, f64)> =
                    allocations.iter().map(|a| (a.user_id, a.amount)).collect();
                assert_eq!(amounts, vec![(h.ruby.id, -140.0), (h.ava.id, -60.0)]);
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Keeping the split type only needs the user list
        let same_type = SplitRequest {
            split_type: None,
            users: vec![input(&h.jack)],
            created_by: None,
        };
        assert!(matches!(
            h.db.update_split_config(ty, tx.id, &same_type, &h.config),
            Err(Error::MissingSplitField { field: "percentage", .. })
        ));

        let other = add_tx(&h.db, ty, -5.0, None);
        assert!(matches!(
            h.db.update_split_config(ty, other.id, &same_type, &h.config),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_split_writes_audit_first() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -40.0, None);
        h.db.create_split_config(
            ty,
            tx.id,
            &request("equal", vec![input(&h.ruby), input(&h.jack)]),
            &h.config,
        )
        .unwrap();

        let audit = h.db.delete_split_config(ty, tx.id, "ruby@example.com").unwrap();
        assert_eq!(audit.action, "delete");
        assert_eq!(audit.requested_by, "ruby@example.com");
        assert_eq!(audit.transaction_id, tx.id);
        assert_eq!(audit.snapshot["config"]["split_type"], "equal");
        assert_eq!(audit.snapshot["allocations"].as_array().unwrap().len(), 2);
        assert_eq!(audit.snapshot["transaction"]["amount"], -40.0);

        let details = h.db.get_split_details(ty, tx.id, &h.config).unwrap();
        assert_eq!(details.view, SplitView::Unallocated);

        assert!(matches!(
            h.db.delete_split_config(ty, tx.id, "ruby@example.com"),
            Err(Error::NotFound(_))
        ));

        let listed = h.db.list_split_audit(Some((ty, tx.id)), 10).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(h
            .db
            .list_split_audit(Some((TransactionType::Offset, tx.id)), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_legacy_fallback_for_both_label() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -64.0, Some("Both"));

        let details = h.db.get_split_details(ty, tx.id, &h.config).unwrap();
        assert!(details.legacy_mode);
        match details.view {
            SplitView::Legacy { label, allocations } => {
                assert_eq!(label, "Both");
                let users: Vec<i64> = allocations.iter().map(|a| a.user_id).collect();
                assert_eq!(users, vec![h.ruby.id, h.jack.id]);
                assert!(allocations.iter().all(|a| a.amount == -32.0 && a.percentage == 50.0));
            }
            other => panic!("unexpected: {:?}", other),
        }

        // the fallback is read-only
        let conn = h.db.conn().unwrap();
        let configs: i64 = conn
            .query_row("SELECT COUNT(*) FROM transaction_split_configs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(configs, 0);
    }

    #[test]
    fn test_legacy_fallback_only_for_shared() {
        let h = household();
        let ty = TransactionType::Personal;
        let tx = add_tx(&h.db, ty, -64.0, Some("Both"));

        let details = h.db.get_split_details(ty, tx.id, &h.config).unwrap();
        assert!(!details.legacy_mode);
        assert_eq!(details.view, SplitView::Unallocated);
        assert!(matches!(
            h.db.get_split_details(ty, 4242, &h.config),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_payment_marking() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -30.0, None);
        let details = h
            .db
            .create_split_config(
                ty,
                tx.id,
                &request("equal", vec![input(&h.ruby), input(&h.jack)]),
                &h.config,
            )
            .unwrap();
        let allocation_id = match details.view {
            SplitView::Explicit { allocations, .. } => allocations[0].id,
            other => panic!("unexpected: {:?}", other),
        };

        let paid = h
            .db
            .update_allocation_payment(
                allocation_id,
                &PaymentUpdate {
                    is_paid: Some(true),
                    paid_date: None,
                    notes: Some(Some("bank transfer".into())),
                },
            )
            .unwrap();
        assert!(paid.is_paid);
        assert!(paid.paid_date.is_some());
        assert_eq!(paid.notes.as_deref(), Some("bank transfer"));

        let unpaid = h
            .db
            .update_allocation_payment(
                allocation_id,
                &PaymentUpdate {
                    is_paid: Some(false),
                    paid_date: None,
                    notes: None,
                },
            )
            .unwrap();
        assert!(!unpaid.is_paid);
        assert_eq!(unpaid.paid_date, None);
        assert_eq!(unpaid.notes.as_deref(), Some("bank transfer"));

        let cleared = h
            .db
            .update_allocation_payment(
                allocation_id,
                &PaymentUpdate {
                    is_paid: None,
                    paid_date: None,
                    notes: Some(None),
                },
            )
            .unwrap();
        assert_eq!(cleared.notes, None);

        assert!(matches!(
            h.db.update_allocation_payment(9999, &PaymentUpdate::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_payment_with_explicit_paid_date() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -30.0, None);
        let details = h
            .db
            .create_split_config(
                ty,
                tx.id,
                &request("equal", vec![input(&h.ruby), input(&h.jack)]),
                &h.config,
            )
            .unwrap();
        let allocation_id = match details.view {
            SplitView::Explicit { allocations, .. } => allocations[1].id,
            other => panic!("unexpected: {:?}", other),
        };

        let update: PaymentUpdate =
            serde_json::from_str(r#"{"paid_date": "2024-03-01"}"#).unwrap();
        let paid = h.db.update_allocation_payment(allocation_id, &update).unwrap();
        assert!(paid.is_paid);
        assert_eq!(
            paid.paid_date.map(|d| d.date_naive()),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );

        // Unpaid wins over a supplied date
        let update: PaymentUpdate =
            serde_json::from_str(r#"{"is_paid": false, "paid_date": "2024-03-02"}"#).unwrap();
        let unpaid = h.db.update_allocation_payment(allocation_id, &update).unwrap();
        assert!(!unpaid.is_paid);
        assert_eq!(unpaid.paid_date, None);
    }

    #[test]
    fn test_identical_split_update_is_noop() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -100.0, None);
        let equal = request("equal", vec![input(&h.ruby), input(&h.jack)]);
        let details = h.db.create_split_config(ty, tx.id, &equal, &h.config).unwrap();
        let (config_before, ids_before) = match details.view {
            SplitView::Explicit {
                config,
                allocations,
            } => (config, allocations.iter().map(|a| a.id).collect::<Vec<_>>()),
            other => panic!("unexpected: {:?}", other),
        };

        h.db.update_allocation_payment(
            ids_before[0],
            &PaymentUpdate {
                is_paid: Some(true),
                notes: Some(Some("paid at the till".into())),
                ..Default::default()
            },
        )
        .unwrap();

        let outcome = h.db.update_split_config(ty, tx.id, &equal, &h.config).unwrap();
        assert!(outcome.no_op);
        match outcome.details.view {
            SplitView::Explicit {
                config,
                allocations,
            } => {
                assert_eq!(config.updated_at, config_before.updated_at);
                let ids: Vec<i64> = allocations.iter().map(|a| a.id).collect();
                assert_eq!(ids, ids_before);
                assert!(allocations[0].is_paid);
                assert_eq!(allocations[0].notes.as_deref(), Some("paid at the till"));
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Same users in another order is still the same split
        let reordered = request("equal", vec![input(&h.jack), input(&h.ruby)]);
        assert!(h.db.update_split_config(ty, tx.id, &reordered, &h.config).unwrap().no_op);

        // A real change rewrites the rows with fresh ids
        let three = request("equal", vec![input(&h.ruby), input(&h.jack), input(&h.ava)]);
        let outcome = h.db.update_split_config(ty, tx.id, &three, &h.config).unwrap();
        assert!(!outcome.no_op);
        match outcome.details.view {
            SplitView::Explicit { allocations, .. } => {
                assert!(allocations.iter().all(|a| !ids_before.contains(&a.id)));
                assert!(allocations.iter().all(|a| !a.is_paid));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_user_balances_include_legacy_shares() {
        let h = household();
        let ty = TransactionType::Shared;
        let explicit = add_tx(&h.db, ty, -60.0, None);
        add_tx(&h.db, ty, -20.0, Some("Both"));
        add_tx(&h.db, ty, -7.0, Some("Jack"));

        let details = h
            .db
            .create_split_config(
                ty,
                explicit.id,
                &request("equal", vec![input(&h.ruby), input(&h.jack), input(&h.ava)]),
                &h.config,
            )
            .unwrap();
        if let SplitView::Explicit { allocations, .. } = details.view {
            let ruby_alloc = allocations.iter().find(|a| a.user_id == h.ruby.id).unwrap();
            h.db.update_allocation_payment(
                ruby_alloc.id,
                &PaymentUpdate {
                    is_paid: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let balances = h.db.user_balances(ty, &h.config).unwrap();
        let names: Vec<&str> = balances.iter().map(|b| b.display_name.as_str()).collect();
        assert_eq!(names, vec!["Ava", "Jack", "Ruby"]);

        let ruby = &balances[2];
        assert_eq!(ruby.allocated, -30.0);
        assert_eq!(ruby.paid, -20.0);
        assert_eq!(ruby.outstanding, -10.0);
        assert_eq!(ruby.allocation_count, 2);

        let jack = &balances[1];
        assert_eq!(jack.allocated, -37.0);
        assert_eq!(jack.paid, 0.0);
        assert_eq!(jack.allocation_count, 3);

        let ava = &balances[0];
        assert_eq!(ava.allocated, -20.0);
    }

    #[test]
    fn test_labeled_listing() {
        let h = household();
        let ty = TransactionType::Shared;
        let pair = add_tx(&h.db, ty, -10.0, None);
        let trio = add_tx(&h.db, ty, -30.0, Some("Ruby"));
        let fixed = add_tx(&h.db, ty, -100.0, Some("Both"));
        let legacy = add_tx(&h.db, ty, -4.0, Some("Jack"));
        let bare = add_tx(&h.db, ty, -1.0, None);

        h.db.create_split_config(ty, pair.id, &request("equal", vec![input(&h.ruby), input(&h.jack)]), &h.config)
            .unwrap();
        h.db.create_split_config(
            ty,
            trio.id,
            &request("equal", vec![input(&h.ruby), input(&h.jack), input(&h.ava)]),
            &h.config,
        )
        .unwrap();
        h.db.create_split_config(
            ty,
            fixed.id,
            &request(
                "fixed",
                vec![
                    AllocationInput {
                        user_id: h.ruby.id,
                        percentage: None,
                        amount: Some(70.0),
                    },
                    AllocationInput {
                        user_id: h.jack.id,
                        percentage: None,
                        amount: Some(30.0),
                    },
                ],
            ),
            &h.config,
        )
        .unwrap();

        let listing = h
            .db
            .list_labeled_transactions(ty, &TransactionQuery::default(), None, &h.config)
            .unwrap();
        let label_of = |id: i64| {
            listing
                .transactions
                .iter()
                .find(|t| t.transaction.id == id)
                .unwrap()
                .effective_label
                .clone()
        };
        assert_eq!(label_of(pair.id).as_deref(), Some("Both"));
        assert_eq!(label_of(trio.id).as_deref(), Some("All users"));
        assert_eq!(label_of(fixed.id), None);
        assert_eq!(label_of(legacy.id).as_deref(), Some("Jack"));
        assert_eq!(label_of(bare.id), None);

        assert_eq!(
            listing.label_options,
            vec![
                Some("Ava".to_string()),
                Some("Jack".to_string()),
                Some("Ruby".to_string()),
                Some("Both".to_string()),
                Some("All users".to_string()),
                None,
            ]
        );

        let unallocated = h
            .db
            .list_labeled_transactions(ty, &TransactionQuery::default(), Some("null"), &h.config)
            .unwrap();
        let ids: Vec<i64> = unallocated.transactions.iter().map(|t| t.transaction.id).collect();
        assert_eq!(ids, vec![bare.id, fixed.id]);
        assert_eq!(unallocated.label_options.len(), 6);
    }

    #[test]
    fn test_label_options_cover_every_page() {
        let h = household();
        let ty = TransactionType::Shared;
        let older = h
            .db
            .create_transaction_from_payload(
                ty,
                &obj(json!({
                    "date": "2024-01-01",
                    "description": "Older",
                    "amount": -20.0,
                    "label": "Both",
                })),
            )
            .unwrap();
        let newer = add_tx(&h.db, ty, -5.0, Some("Ruby"));

        let first_page = TransactionQuery {
            limit: Some(1),
            ..Default::default()
        };
        let listing = h
            .db
            .list_labeled_transactions(ty, &first_page, None, &h.config)
            .unwrap();
        let ids: Vec<i64> = listing.transactions.iter().map(|t| t.transaction.id).collect();
        assert_eq!(ids, vec![newer.id]);
        assert!(listing.label_options.contains(&Some("Both".to_string())));

        let second_page = TransactionQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        let listing = h
            .db
            .list_labeled_transactions(ty, &second_page, None, &h.config)
            .unwrap();
        let ids: Vec<i64> = listing.transactions.iter().map(|t| t.transaction.id).collect();
        assert_eq!(ids, vec![older.id]);
        assert!(listing.label_options.contains(&Some("Ruby".to_string())));
    }

    #[test]
    fn test_amount_changes_blocked_while_configured() {
        let h = household();
        let ty = TransactionType::Shared;
        let tx = add_tx(&h.db, ty, -100.0, None);
        h.db.create_split_config(ty, tx.id, &request("equal", vec![input(&h.ruby), input(&h.jack)]), &h.config)
            .unwrap();

        let split = AmountSplitRequest {
            original_transaction_id: tx.id,
            remaining_amount: 40.0,
            split_transactions: vec![SplitOffTransaction {
                description: "Carved off".into(),
                amount: 60.0,
                category: None,
                label: None,
                date: None,
            }],
        };
        assert!(matches!(h.db.split_transaction(ty, &split), Err(Error::Conflict(_))));
        assert!(matches!(
            h.db.update_transaction(ty, tx.id, &obj(json!({"amount": -40.0}))),
            Err(Error::Conflict(_))
        ));

        let stored = h.db.get_transaction(ty, tx.id).unwrap().unwrap();
        assert_eq!(stored.amount, -100.0);
        assert!(!stored.has_split);
        let count = h.db.list_transactions(ty, &TransactionQuery::default()).unwrap().len();
        assert_eq!(count, 1);

        // Other fields stay editable, and an unchanged amount is fine
        let outcome = h
            .db
            .update_transaction(ty, tx.id, &obj(json!({"amount": "-100", "mark": true})))
            .unwrap();
        assert_eq!(outcome.changed_fields, vec!["mark".to_string()]);

        h.db.delete_split_config(ty, tx.id, "tester").unwrap();
        let outcome = h.db.split_transaction(ty, &split).unwrap();
        assert_eq!(outcome.original.amount, -40.0);
    }

    #[test]
    fn test_list_transactions_filters_and_limits() {
        let db = Database::in_memory().unwrap();
        let ty = TransactionType::Shared;
        for (day, amount) in [(1, -1.0), (2, -2.0), (3, -3.0)] {
            db.create_transaction_from_payload(
                ty,
                &obj(json!({
                    "date": format!("2024-04-0{}", day),
                    "description": "Coffee",
                    "amount": amount,
                })),
            )
            .unwrap();
        }

        let newest = db
            .list_transactions(
                ty,
                &TransactionQuery {
                    limit: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(newest.len(), 1);
        assert_eq!(newest[0].amount, -3.0);

        let ranged = db
            .list_transactions(
                ty,
                &TransactionQuery {
                    start_date: NaiveDate::from_ymd_opt(2024, 4, 2),
                    end_date: NaiveDate::from_ymd_opt(2024, 4, 2),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].amount, -2.0);
    }

    #[test]
    fn test_apply_auto_labels() {
        let h = household();
        let ty = TransactionType::Shared;
        db_category_tx(&h.db, "Dining", -10.0);
        let gym = db_category_tx(&h.db, "Gym", -20.0);
        let groceries = db_category_tx(&h.db, "Groceries", -30.0);
        let configured = db_category_tx(&h.db, "Groceries", -40.0);
        h.db.create_split_config(
            ty,
            configured.id,
            &request("equal", vec![input(&h.ruby), input(&h.jack)]),
            &h.config,
        )
        .unwrap();

        assert_eq!(h.db.apply_auto_labels(&h.config).unwrap(), 2);

        let gym = h.db.get_transaction(ty, gym.id).unwrap().unwrap();
        assert_eq!(gym.label.as_deref(), Some("Ruby"));
        let groceries = h.db.get_transaction(ty, groceries.id).unwrap().unwrap();
        assert_eq!(groceries.label.as_deref(), Some("Both"));
        let configured = h.db.get_transaction(ty, configured.id).unwrap().unwrap();
        assert_eq!(configured.label, None);

        assert_eq!(h.db.apply_auto_labels(&h.config).unwrap(), 0);
    }

    fn db_category_tx(db: &Database, category: &str, amount: f64) -> Transaction {
        let ty = TransactionType::Shared;
        db.create_category(ty, category).unwrap();
        db.create_transaction_from_payload(
            ty,
            &obj(json!({
                "date": "2024-05-01",
                "description": category,
                "amount": amount,
                "category": category,
            })),
        )
        .unwrap()
    }

    #[test]
    fn test_audit_log() {
        let db = Database::in_memory().unwrap();
        db.log_audit("local-dev", "create", Some("transaction"), Some(1), None)
            .unwrap();
        db.log_audit("local-dev", "update", Some("transaction"), Some(1), Some("{}"))
            .unwrap();

        let entries = db.list_audit_log(10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "update");
    }
}
