//! Edit schema and the draft → update payload translation.

use std::collections::BTreeMap;

use listgrid_api::{FieldDescriptor, FieldKind, LookupCell, LookupOption, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::GridError;
use crate::value::{is_truthy, iso_timestamp, json_number, parse_datetime, parse_number};

// ════════════════════════════════════════════════════════════════
//  Draft values
// ════════════════════════════════════════════════════════════════

/// `(id, title)` display pair of a selected lookup row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupPick {
    pub key: i64,
    #[serde(default)]
    pub text: String,
}

/// One pending edit value, in whichever shape the editor produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Lookup(LookupPick),
    Lookups(Vec<LookupPick>),
    Wrapped { results: Vec<LookupPick> },
    Choices(Vec<String>),
}

impl EditValue {
    /// Selected lookup ids; `None` for shapes that carry no lookup selection.
    fn lookup_ids(&self) -> Option<Vec<i64>> {
        match self {
            EditValue::Null => Some(Vec::new()),
            EditValue::Lookup(p) => Some(vec![p.key]),
            EditValue::Lookups(v) | EditValue::Wrapped { results: v } => {
                Some(v.iter().map(|p| p.key).collect())
            }
            EditValue::Number(n) if n.fract() == 0.0 => Some(vec![*n as i64]),
            EditValue::Text(s) if s.trim().is_empty() => Some(Vec::new()),
            EditValue::Text(s) => s.trim().parse().ok().map(|id| vec![id]),
            _ => None,
        }
    }

    fn to_json(&self) -> Value {
        match self {
            EditValue::Null => Value::Null,
            EditValue::Bool(b) => Value::Bool(*b),
            EditValue::Number(n) => json_number(*n),
            EditValue::Text(s) => Value::String(s.clone()),
            EditValue::Choices(v) => json!(v),
            EditValue::Lookup(p) => json!(p),
            EditValue::Lookups(v) | EditValue::Wrapped { results: v } => json!(v),
        }
    }
}

/// Pending edits keyed by internal field name. Sparse: untouched fields are absent.
pub type EditDraft = BTreeMap<String, EditValue>;

// ════════════════════════════════════════════════════════════════
//  Edit schema
// ════════════════════════════════════════════════════════════════

/// Input control a field is edited with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "camelCase")]
pub enum EditControl {
    Toggle,
    Select { options: Vec<String>, multiple: bool },
    LookupSelect { options: Vec<LookupOption>, multiple: bool },
    Number,
    Date,
    Text,
}

impl EditControl {
    /// Control for `field`. Lookup pickers get their options from `options`.
    pub fn for_field(field: &FieldDescriptor, options: Option<&[LookupOption]>) -> Self {
        match field.kind {
            FieldKind::Boolean => EditControl::Toggle,
            FieldKind::Choice | FieldKind::MultiChoice => EditControl::Select {
                options: field.choices.clone().unwrap_or_default(),
                multiple: field.kind == FieldKind::MultiChoice,
            },
            FieldKind::Lookup | FieldKind::User => EditControl::LookupSelect {
                options: options.map(<[_]>::to_vec).unwrap_or_default(),
                multiple: field.allow_multiple,
            },
            FieldKind::Number | FieldKind::Currency => EditControl::Number,
            FieldKind::DateTime => EditControl::Date,
            FieldKind::Text | FieldKind::Other(_) => EditControl::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditField {
    #[serde(flatten)]
    pub descriptor: FieldDescriptor,
    #[serde(flatten)]
    pub control: EditControl,
}

// ════════════════════════════════════════════════════════════════
//  Item → draft
// ════════════════════════════════════════════════════════════════

/// Shape one stored item as a draft: lookups as `{key, text}` pairs (a list
/// for multi-value fields), everything else as the raw scalar.
pub fn draft_from_item(item: &Row, fields: &[FieldDescriptor]) -> EditDraft {
    let mut draft = EditDraft::new();
    for field in fields {
        let name = field.internal_name.as_str();
        let value = if field.kind.is_reference() {
            let refs = LookupCell::decode(item, name).map(|c| c.refs()).unwrap_or_default();
            let picks: Vec<LookupPick> = refs
                .into_iter()
                .map(|r| LookupPick { text: r.title.unwrap_or_else(|| r.id.to_string()), key: r.id })
                .collect();
            if field.allow_multiple {
                EditValue::Lookups(picks)
            } else {
                picks.into_iter().next().map(EditValue::Lookup).unwrap_or(EditValue::Null)
            }
        } else {
            match item.get(name) {
                None | Some(Value::Null) => EditValue::Null,
                Some(Value::Bool(b)) => EditValue::Bool(*b),
                Some(Value::Number(n)) => n.as_f64().map(EditValue::Number).unwrap_or(EditValue::Null),
                Some(Value::String(s)) => EditValue::Text(s.clone()),
                Some(Value::Array(items)) => EditValue::Choices(
                    items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
                ),
                Some(Value::Object(map)) => match map.get("results") {
                    Some(Value::Array(items)) => EditValue::Choices(
                        items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
                    ),
                    _ => EditValue::Null,
                },
            }
        };
        draft.insert(name.to_string(), value);
    }
    draft
}

// ════════════════════════════════════════════════════════════════
//  Draft → payload
// ════════════════════════════════════════════════════════════════

/// Update payload for the store, one entry per editable field present in `draft`.
///
/// Lookups go out as `<field>Id: id | null` or `<field>Id: {results: [ids]}`.
pub fn update_payload(schema: &[FieldDescriptor], draft: &EditDraft) -> Result<Row, GridError> {
    let mut payload = Row::new();
    for field in schema.iter().filter(|f| !f.read_only) {
        let name = field.internal_name.as_str();
        let Some(value) = draft.get(name) else { continue };

        match &field.kind {
            FieldKind::Lookup | FieldKind::User => {
                let ids = value
                    .lookup_ids()
                    .ok_or_else(|| GridError::invalid_value(name, "expected a lookup selection"))?;
                let wire = if field.allow_multiple {
                    json!({ "results": ids })
                } else {
                    ids.first().map_or(Value::Null, |id| Value::from(*id))
                };
                payload.insert(format!("{name}Id"), wire);
            }
            FieldKind::MultiChoice => {
                let choices = match value {
                    EditValue::Null => Vec::new(),
                    EditValue::Lookups(v) if v.is_empty() => Vec::new(),
                    EditValue::Choices(v) => v.clone(),
                    EditValue::Text(s) if s.is_empty() => Vec::new(),
                    EditValue::Text(s) => vec![s.clone()],
                    _ => return Err(GridError::invalid_value(name, "expected a list of choices")),
                };
                payload.insert(name.to_string(), json!(choices));
            }
            FieldKind::Boolean => {
                payload.insert(name.to_string(), Value::Bool(is_truthy(&value.to_json())));
            }
            FieldKind::Number | FieldKind::Currency => {
                let wire = match value {
                    EditValue::Null => Value::Null,
                    EditValue::Text(s) if s.trim().is_empty() => Value::Null,
                    other => parse_number(&other.to_json())
                        .map(json_number)
                        .ok_or_else(|| GridError::invalid_value(name, "not a number"))?,
                };
                payload.insert(name.to_string(), wire);
            }
            FieldKind::DateTime => {
                let wire = match value {
                    EditValue::Null => Value::Null,
                    EditValue::Text(s) if s.trim().is_empty() => Value::Null,
                    other => parse_datetime(&other.to_json())
                        .map(|dt| Value::String(iso_timestamp(&dt)))
                        .ok_or_else(|| GridError::invalid_value(name, "not a date"))?,
                };
                payload.insert(name.to_string(), wire);
            }
            _ => {
                payload.insert(name.to_string(), value.to_json());
            }
        }
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: FieldKind) -> FieldDescriptor {
        FieldDescriptor { kind, ..FieldDescriptor::text(name) }
    }

    fn lookup(name: &str, multi: bool) -> FieldDescriptor {
        FieldDescriptor { allow_multiple: multi, ..field(name, FieldKind::Lookup) }
    }

    fn draft(v: Value) -> EditDraft {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn lookups_serialize_to_id_keys() {
        let schema = vec![lookup("Proveedor", true), lookup("Chofer", false), lookup("Taller", false)];
        let payload = update_payload(
            &schema,
            &draft(json!({
                "Proveedor": [{ "key": 10, "text": "Acme" }, { "key": 20, "text": "Zenith" }],
                "Chofer": { "key": 5, "text": "Ana" },
                "Taller": null
            })),
        )
        .unwrap();
        assert_eq!(payload["ProveedorId"], json!({ "results": [10, 20] }));
        assert_eq!(payload["ChoferId"], json!(5));
        assert_eq!(payload["TallerId"], Value::Null);
        assert!(payload.get("Proveedor").is_none());
    }

    #[test]
    fn wrapped_results_are_accepted_for_multi_lookups() {
        let schema = vec![lookup("Proveedor", true)];
        let payload =
            update_payload(&schema, &draft(json!({ "Proveedor": { "results": [{ "key": 7 }] } }))).unwrap();
        assert_eq!(payload["ProveedorId"], json!({ "results": [7] }));
    }

    #[test]
    fn numbers_and_dates_follow_empty_is_null() {
        let schema = vec![
            field("Km", FieldKind::Number),
            field("Costo", FieldKind::Currency),
            field("Vence", FieldKind::DateTime),
            field("Alta", FieldKind::DateTime),
        ];
        let payload = update_payload(
            &schema,
            &draft(json!({ "Km": "1500", "Costo": "", "Vence": "2024-03-01", "Alta": null })),
        )
        .unwrap();
        assert_eq!(payload["Km"], json!(1500));
        assert_eq!(payload["Costo"], Value::Null);
        assert_eq!(payload["Vence"], json!("2024-03-01T00:00:00.000Z"));
        assert_eq!(payload["Alta"], Value::Null);
    }

    #[test]
    fn bad_number_is_a_validation_error() {
        let schema = vec![field("Km", FieldKind::Number)];
        let err = update_payload(&schema, &draft(json!({ "Km": "abc" }))).unwrap_err();
        assert!(matches!(err, GridError::InvalidValue { ref field, .. } if field == "Km"));
    }

    #[test]
    fn read_only_and_absent_fields_are_skipped() {
        let schema = vec![
            FieldDescriptor { read_only: true, ..FieldDescriptor::text("Codigo") },
            FieldDescriptor::text("Placa"),
            FieldDescriptor::text("Marca"),
        ];
        let payload = update_payload(&schema, &draft(json!({ "Codigo": "X", "Placa": "AB123" }))).unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload["Placa"], json!("AB123"));
    }

    #[test]
    fn booleans_and_choices() {
        let schema = vec![
            field("Activo", FieldKind::Boolean),
            field("Extras", FieldKind::MultiChoice),
            field("Estado", FieldKind::Choice),
        ];
        let payload = update_payload(
            &schema,
            &draft(json!({ "Activo": "TRUE", "Extras": ["GPS", "Radio"], "Estado": "Baja" })),
        )
        .unwrap();
        assert_eq!(payload["Activo"], json!(true));
        assert_eq!(payload["Extras"], json!(["GPS", "Radio"]));
        assert_eq!(payload["Estado"], json!("Baja"));
    }

    #[test]
    fn item_values_invert_to_the_same_payload() {
        let schema = vec![lookup("Proveedor", true), lookup("Chofer", false), field("Km", FieldKind::Number)];
        let item: Row = serde_json::from_value(json!({
            "Proveedor": [{ "Id": 10, "Title": "Acme" }],
            "Chofer": { "Id": 5, "Title": "Ana" },
            "Km": 1200
        }))
        .unwrap();
        let d = draft_from_item(&item, &schema);
        assert_eq!(d["Chofer"], EditValue::Lookup(LookupPick { key: 5, text: "Ana".into() }));
        let payload = update_payload(&schema, &d).unwrap();
        assert_eq!(payload["ProveedorId"], json!({ "results": [10] }));
        assert_eq!(payload["ChoferId"], json!(5));
        assert_eq!(payload["Km"], json!(1200));
    }

    #[test]
    fn controls_follow_field_kind() {
        let multi = lookup("Proveedor", true);
        let opts = [LookupOption { key: 1, text: "Acme".into() }];
        assert_eq!(
            EditControl::for_field(&multi, Some(&opts)),
            EditControl::LookupSelect { options: opts.to_vec(), multiple: true }
        );
        assert_eq!(EditControl::for_field(&field("Activo", FieldKind::Boolean), None), EditControl::Toggle);
        assert_eq!(EditControl::for_field(&field("X", FieldKind::Other("Url".into())), None), EditControl::Text);
    }
}
