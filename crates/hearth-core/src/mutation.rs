//! Transaction payload validation
//!
//! Turns loosely typed JSON payloads into validated inserts and field
//! updates. Every field is checked before anything is returned so callers get
//! the complete list of problems in one [`Error::Validation`].

use serde_json::{Map, Value};

use crate::error::{Error, FieldError, Result};
use crate::models::{CategoryRef, NewTransaction};
use crate::normalize::{coerce, FieldType, NormalizedValue};

/// Writable transaction fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxField {
    Date,
    Description,
    Amount,
    Category,
    Label,
    Mark,
    ClosingBalance,
}

/// Fields that are accepted in payloads but never written by a client
const READ_ONLY_FIELDS: &[&str] = &["id", "has_split", "split_from_id", "created_at", "category_id"];

impl TxField {
    pub fn all() -> &'static [TxField] {
        &[
            Self::Date,
            Self::Description,
            Self::Amount,
            Self::Category,
            Self::Label,
            Self::Mark,
            Self::ClosingBalance,
        ]
    }

    /// Payload key; `bank_category` is accepted as an alias of `category`
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "date" => Some(Self::Date),
            "description" => Some(Self::Description),
            "amount" => Some(Self::Amount),
            "category" | "bank_category" => Some(Self::Category),
            "label" => Some(Self::Label),
            "mark" => Some(Self::Mark),
            "closing_balance" => Some(Self::ClosingBalance),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Date => "date",
            Self::Description => "description",
            Self::Amount => "amount",
            Self::Category => "category",
            Self::Label => "label",
            Self::Mark => "mark",
            Self::ClosingBalance => "closing_balance",
        }
    }

    /// Column in every domain table
    pub fn column(&self) -> &'static str {
        self.name()
    }

    /// Comparison type; categories compare as resolved ids
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Date => FieldType::Date,
            Self::Description | Self::Label => FieldType::String,
            Self::Amount | Self::ClosingBalance | Self::Category => FieldType::Number,
            Self::Mark => FieldType::Boolean,
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, Self::Date | Self::Description | Self::Amount)
    }
}

/// A validated new value for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Plain(NormalizedValue),
    /// Unresolved category reference; `None` clears the category
    Category(Option<CategoryRef>),
}

/// One validated field of an update payload
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub field: TxField,
    pub value: FieldValue,
}

/// Interpret a raw category value as an id or a name
///
/// Integers and numeric strings are ids; other strings are names.
pub fn category_ref(value: &Value) -> std::result::Result<Option<CategoryRef>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => match n.as_i64() {
            Some(id) => Ok(Some(CategoryRef::Id(id))),
            None => Err("category id must be an integer".to_string()),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else if let Ok(id) = s.parse::<i64>() {
                Ok(Some(CategoryRef::Id(id)))
            } else {
                Ok(Some(CategoryRef::Name(s.to_string())))
            }
        }
        _ => Err("must be a category name or id".to_string()),
    }
}

fn validate_field(field: TxField, value: &Value) -> std::result::Result<FieldValue, String> {
    if field == TxField::Category {
        return category_ref(value).map(FieldValue::Category);
    }

    let normalized = coerce(value, field.field_type())?;
    if normalized.is_absent() && field.is_required() {
        return Err("is required".to_string());
    }
    if field == TxField::Mark && normalized.is_absent() {
        return Ok(FieldValue::Plain(NormalizedValue::Bool(false)));
    }
    Ok(FieldValue::Plain(normalized))
}

/// Validate every key of an update payload
///
/// Read-only fields are skipped; unknown keys are errors. A payload naming
/// both `category` and `bank_category` keeps the last one seen.
pub fn parse_update(payload: &Map<String, Value>) -> Result<Vec<FieldUpdate>> {
    let mut errors = Vec::new();
    let mut updates: Vec<FieldUpdate> = Vec::new();

    for (key, value) in payload {
        if READ_ONLY_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let Some(field) = TxField::from_key(key) else {
            errors.push(FieldError::new(key.clone(), "unknown field"));
            continue;
        };
        match validate_field(field, value) {
            Ok(value) => {
                updates.retain(|u| u.field != field);
                updates.push(FieldUpdate { field, value });
            }
            Err(message) => errors.push(FieldError::new(field.name(), message)),
        }
    }

    if errors.is_empty() {
        Ok(updates)
    } else {
        Err(Error::Validation(errors))
    }
}

/// Validate a creation payload into a [`NewTransaction`]
pub fn parse_new_transaction(payload: &Map<String, Value>) -> Result<NewTransaction> {
    let mut errors = Vec::new();

    let id = match payload.get("id") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) if n.as_i64().is_some() => n.as_i64(),
        Some(_) => {
            errors.push(FieldError::new("id", "must be an integer"));
            None
        }
    };

    for field in TxField::all().iter().filter(|f| f.is_required()) {
        let present = payload
            .get(field.name())
            .map(|v| !matches!(v, Value::Null) && v.as_str().map_or(true, |s| !s.trim().is_empty()))
            .unwrap_or(false);
        if !present {
            errors.push(FieldError::new(field.name(), "is required"));
        }
    }

    let updates = match parse_update(payload) {
        Ok(updates) => updates,
        Err(Error::Validation(mut field_errors)) => {
            // required-field errors were already reported above
            field_errors.retain(|e| !errors.iter().any(|x: &FieldError| x.field == e.field));
            errors.extend(field_errors);
            Vec::new()
        }
        Err(other) => return Err(other),
    };

    if !errors.is_empty() {
        return Err(Error::Validation(errors));
    }

    let mut date = None;
    let mut description = String::new();
    let mut amount = None;
    let mut category = None;
    let mut label = None;
    let mut mark = false;
    let mut closing_balance = None;

    for update in updates {
        match (update.field, update.value) {
            (TxField::Category, FieldValue::Category(c)) => category = c,
            (TxField::Date, FieldValue::Plain(v)) => date = v.as_date(),
            (TxField::Description, FieldValue::Plain(v)) => {
                description = v.as_text().unwrap_or_default().to_string()
            }
            (TxField::Amount, FieldValue::Plain(v)) => amount = v.as_f64(),
            (TxField::Label, FieldValue::Plain(v)) => label = v.as_text().map(String::from),
            (TxField::Mark, FieldValue::Plain(v)) => mark = v.as_bool().unwrap_or(false),
            (TxField::ClosingBalance, FieldValue::Plain(v)) => closing_balance = v.as_f64(),
            (field, _) => {
                return Err(Error::InvalidData(format!(
                    "unexpected value for {}",
                    field.name()
                )))
            }
        }
    }

    Ok(NewTransaction {
        id,
        date: date.ok_or_else(|| Error::invalid_field("date", "is required"))?,
        description,
        amount: amount.ok_or_else(|| Error::invalid_field("amount", "is required"))?,
        category,
        label,
        mark,
        closing_balance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_new_transaction() {
        let tx = parse_new_transaction(&obj(json!({
            "date": "2024-02-01T09:30:00",
            "description": " Woolworths ",
            "amount": "-45.20",
            "bank_category": "Groceries",
            "mark": "1"
        })))
        .unwrap();

        assert_eq!(tx.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(tx.description, "Woolworths");
        assert_eq!(tx.amount, -45.2);
        assert_eq!(tx.category, Some(CategoryRef::Name("Groceries".into())));
        assert!(tx.mark);
        assert_eq!(tx.label, None);
    }

    #[test]
    fn test_parse_new_transaction_collects_all_errors() {
        let err = parse_new_transaction(&obj(json!({
            "date": "not a date",
            "amount": "lots",
            "mark": "perhaps",
            "colour": "red"
        })))
        .unwrap_err();

        let mut fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        fields.sort();
        assert_eq!(fields, vec!["amount", "colour", "date", "description", "mark"]);
    }

    #[test]
    fn test_parse_update_skips_read_only() {
        let updates = parse_update(&obj(json!({
            "id": 5,
            "has_split": true,
            "label": "Both"
        })))
        .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].field, TxField::Label);
    }

    #[test]
    fn test_parse_update_rejects_clearing_required() {
        let err = parse_update(&obj(json!({"description": "  "}))).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "description");
    }

    #[test]
    fn test_category_ref() {
        assert_eq!(category_ref(&json!(4)).unwrap(), Some(CategoryRef::Id(4)));
        assert_eq!(category_ref(&json!("12")).unwrap(), Some(CategoryRef::Id(12)));
        assert_eq!(
            category_ref(&json!("Fuel")).unwrap(),
            Some(CategoryRef::Name("Fuel".into()))
        );
        assert_eq!(category_ref(&json!("")).unwrap(), None);
        assert!(category_ref(&json!(1.5)).is_err());
        assert!(category_ref(&json!([1])).is_err());
    }
}
