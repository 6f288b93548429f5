use serde_json::Value;

use crate::types::Row;

/// One referenced row: numeric id plus the display title when the store sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRef {
    pub id: i64,
    pub title: Option<String>,
}

/// Raw value of a lookup/user field, decoded once from whichever shape the
/// store delivered.
///
/// - `Scalar`: nested `{Id, Title}` object under the field name.
/// - `Array`: array of ids or `{Id, Title}` objects (also `{results: [...]}`).
/// - `IdRef`: bare numeric id, usually under the `<field>Id` sibling key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupCell {
    Scalar(LookupRef),
    Array(Vec<LookupRef>),
    IdRef(i64),
}

impl LookupCell {
    /// Keys probed for a field, in order.
    pub fn candidate_keys(field: &str) -> [String; 3] {
        [format!("{field}Id"), format!("{field}_Id"), field.to_string()]
    }

    /// Probe `<field>Id`, `<field>_Id`, `<field>` and decode the first usable value.
    ///
    /// An empty array is remembered but does not stop the probe; it is
    /// returned only if no later key yields ids.
    pub fn decode(row: &Row, field: &str) -> Option<LookupCell> {
        let mut empty = None;
        for (i, key) in Self::candidate_keys(field).iter().enumerate() {
            let id_key = i < 2;
            let Some(value) = row.get(key) else { continue };
            match Self::decode_value(value, id_key) {
                Some(LookupCell::Array(refs)) if refs.is_empty() => {
                    empty = Some(LookupCell::Array(refs));
                }
                Some(cell) => return Some(cell),
                None => {}
            }
        }
        empty
    }

    fn decode_value(value: &Value, id_key: bool) -> Option<LookupCell> {
        match value {
            Value::Array(items) => Some(LookupCell::Array(items.iter().filter_map(lookup_ref).collect())),
            Value::Number(n) => n.as_i64().map(LookupCell::IdRef),
            Value::String(s) if id_key => s.trim().parse().ok().map(LookupCell::IdRef),
            Value::Object(map) => match map.get("results") {
                Some(Value::Array(items)) => {
                    Some(LookupCell::Array(items.iter().filter_map(lookup_ref).collect()))
                }
                _ => lookup_ref(value).map(LookupCell::Scalar),
            },
            _ => None,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, LookupCell::Array(_))
    }

    pub fn refs(&self) -> Vec<LookupRef> {
        match self {
            LookupCell::Scalar(r) => vec![r.clone()],
            LookupCell::Array(refs) => refs.clone(),
            LookupCell::IdRef(id) => vec![LookupRef { id: *id, title: None }],
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        self.refs().into_iter().map(|r| r.id).collect()
    }
}

fn lookup_ref(value: &Value) -> Option<LookupRef> {
    match value {
        Value::Number(n) => n.as_i64().map(|id| LookupRef { id, title: None }),
        Value::String(s) => s.trim().parse().ok().map(|id| LookupRef { id, title: None }),
        Value::Object(map) => {
            let id = ["Id", "ID", "id"].iter().find_map(|k| match map.get(*k) {
                Some(Value::Number(n)) => n.as_i64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            })?;
            let title = ["Title", "title"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            Some(LookupRef { id, title })
        }
        _ => None,
    }
}
