//! Evaluation of query documents against in-memory rows.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use listgrid_api::{CamlValue, CompareOp, FieldRef, OrderBy, Predicate, Row, StoreError};
use listgrid_api::caml::ValueContent;
use serde_json::Value;

/// What the evaluator needs to know about the list being queried.
pub(crate) trait FieldLookup {
    /// Whether `field` holds references to another list's rows.
    fn is_reference(&self, field: &str) -> bool;

    /// Display title of row `id` in the target list of `field`.
    fn reference_title(&self, field: &str, id: i64) -> Option<String>;
}

pub(crate) fn matches(pred: &Predicate, row: &Row, fields: &dyn FieldLookup) -> Result<bool, StoreError> {
    match pred {
        Predicate::And(l, r) => Ok(matches(l, row, fields)? && matches(r, row, fields)?),
        Predicate::Or(l, r) => Ok(matches(l, row, fields)? || matches(r, row, fields)?),
        Predicate::Compare { op, field, value } => compare(*op, field, value.as_ref(), row, fields),
        Predicate::Raw(markup) => Err(StoreError::invalid_query(format!(
            "operator not supported by the memory store: {markup}"
        ))),
    }
}

/// Ids stored under `<field>Id`, as a number or an array of numbers.
pub(crate) fn reference_ids(row: &Row, field: &str) -> Vec<i64> {
    match row.get(&format!("{field}Id")) {
        Some(Value::Number(n)) => n.as_i64().into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_i64).collect(),
        _ => Vec::new(),
    }
}

fn cell_values(field: &FieldRef, row: &Row, fields: &dyn FieldLookup) -> Vec<Value> {
    if fields.is_reference(&field.name) {
        let ids = reference_ids(row, &field.name);
        return if field.lookup_id {
            ids.into_iter().map(Value::from).collect()
        } else {
            ids.into_iter()
                .filter_map(|id| fields.reference_title(&field.name, id))
                .map(Value::String)
                .collect()
        };
    }
    match row.get(&field.name) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn compare(
    op: CompareOp,
    field: &FieldRef,
    value: Option<&CamlValue>,
    row: &Row,
    fields: &dyn FieldLookup,
) -> Result<bool, StoreError> {
    let cells = cell_values(field, row, fields);
    match op {
        CompareOp::IsNull => return Ok(cells.is_empty()),
        CompareOp::IsNotNull => return Ok(!cells.is_empty()),
        _ => {}
    }
    let value = value.ok_or_else(|| {
        StoreError::invalid_query(format!("<{}> on '{}' without a value", op.tag(), field.name))
    })?;
    let expected = Scalar::from_value(value)?;

    let hit = |cell: &Value| -> bool {
        match op {
            CompareOp::Contains => text_of(cell).contains(&expected.text()),
            CompareOp::BeginsWith => text_of(cell).starts_with(&expected.text()),
            _ => match expected.cmp_cell(cell) {
                Some(ord) => match op {
                    CompareOp::Eq | CompareOp::Neq => ord == Ordering::Equal,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Geq => ord != Ordering::Less,
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Leq => ord != Ordering::Greater,
                    _ => false,
                },
                None => false,
            },
        }
    };
    let any = cells.iter().any(hit);
    Ok(if op == CompareOp::Neq { !any } else { any })
}

// ════════════════════════════════════════════════════════════════
//  Typed scalars
// ════════════════════════════════════════════════════════════════

enum Scalar {
    Number(f64),
    Date(DateTime<Utc>, bool),
    Text(String),
}

impl Scalar {
    fn from_value(value: &CamlValue) -> Result<Self, StoreError> {
        let ty = value.value_type.to_ascii_lowercase();
        let text = match &value.content {
            ValueContent::Text(s) => s.trim().to_string(),
            ValueContent::Markup(m) if m.contains("<Today") && ty == "datetime" => {
                return Ok(Scalar::Date(Utc::now(), false));
            }
            ValueContent::Markup(m) => {
                return Err(StoreError::invalid_query(format!("unsupported value markup: {m}")));
            }
        };
        let bad = || StoreError::invalid_query(format!("'{text}' is not a valid {} value", value.value_type));
        Ok(match ty.as_str() {
            "number" | "currency" | "counter" | "integer" => {
                Scalar::Number(text.parse().map_err(|_| bad())?)
            }
            "boolean" => Scalar::Number(if truthy_text(&text) { 1.0 } else { 0.0 }),
            "lookup" | "user" => match text.parse::<f64>() {
                Ok(n) => Scalar::Number(n),
                Err(_) => Scalar::Text(text.to_lowercase()),
            },
            "datetime" => Scalar::Date(parse_date(&text).ok_or_else(bad)?, value.include_time),
            _ => Scalar::Text(text.to_lowercase()),
        })
    }

    fn text(&self) -> String {
        match self {
            Scalar::Number(n) => n.to_string(),
            Scalar::Date(d, _) => d.to_rfc3339(),
            Scalar::Text(s) => s.clone(),
        }
    }

    /// Ordering of `cell` relative to this value.
    fn cmp_cell(&self, cell: &Value) -> Option<Ordering> {
        match self {
            Scalar::Number(n) => number_of(cell)?.partial_cmp(n),
            Scalar::Date(d, with_time) => {
                let c = parse_date(cell.as_str()?)?;
                if *with_time {
                    Some(c.cmp(d))
                } else {
                    Some(c.date_naive().cmp(&d.date_naive()))
                }
            }
            Scalar::Text(s) => Some(text_of(cell).as_str().cmp(s.as_str())),
        }
    }
}

fn truthy_text(s: &str) -> bool {
    s == "1" || s.eq_ignore_ascii_case("true")
}

fn number_of(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Some(1.0),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Some(0.0),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_of(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.to_lowercase(),
        Value::Null => String::new(),
        other => other.to_string().to_lowercase(),
    }
}

pub(crate) fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// ════════════════════════════════════════════════════════════════
//  Ordering
// ════════════════════════════════════════════════════════════════

pub(crate) fn sort_rows(rows: &mut [Row], order_by: &OrderBy, fields: &dyn FieldLookup) {
    rows.sort_by(|a, b| {
        for f in &order_by.fields {
            let key = if fields.is_reference(&f.name) { format!("{}Id", f.name) } else { f.name.clone() };
            let ord = cmp_json(a.get(&key), b.get(&key));
            let ord = if f.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn cmp_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal)
        }
        (Some(x), Some(y)) => text_of(x).cmp(&text_of(y)),
    }
}
