use serde::{Deserialize, Deserializer, Serialize};

// ════════════════════════════════════════════════════════════════
//  Rows
// ════════════════════════════════════════════════════════════════

/// One list item as delivered by the store: internal field name → raw value.
///
/// Lookup and user fields arrive in one of several shapes (see
/// [`crate::lookup::LookupCell`]); everything else is a plain JSON scalar.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Numeric item id of a row (`ID`, falling back to `Id`).
pub fn row_id(row: &Row) -> Option<i64> {
    ["ID", "Id"]
        .iter()
        .filter_map(|k| row.get(*k))
        .find_map(|v| match v {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

// ════════════════════════════════════════════════════════════════
//  Lists & views
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Entry of the site's list catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SiteList {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Stored configuration of a list view, read at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ViewInfo {
    /// Inner body of the view's `<Query>` element (`<Where>`, `<OrderBy>`, ...).
    #[serde(default)]
    pub view_query: Option<String>,
    #[serde(default)]
    pub row_limit: Option<i64>,
    /// Full view schema markup, used when the structured field list is unavailable.
    #[serde(default)]
    pub html_schema_xml: Option<String>,
}

/// `(id, title)` pair from a lookup target list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOption {
    pub key: i64,
    pub text: String,
}

/// Field requested from `ListStore::item`. Expanded fields come back as
/// `{Id, Title}` objects (or arrays of them).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemProjection {
    pub name: String,
    pub expand: bool,
}

impl ItemProjection {
    pub fn plain(name: impl Into<String>) -> Self {
        Self { name: name.into(), expand: false }
    }

    pub fn expanded(name: impl Into<String>) -> Self {
        Self { name: name.into(), expand: true }
    }
}

// ════════════════════════════════════════════════════════════════
//  Field schema (raw, as the store describes it)
// ════════════════════════════════════════════════════════════════

/// Field definition as returned by the store, before type dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldSchema {
    pub internal_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub type_as_string: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only_field: bool,
    #[serde(default)]
    pub lookup_list: Option<String>,
    #[serde(default)]
    pub allow_multiple_values: bool,
    #[serde(default, deserialize_with = "string_list")]
    pub choices: Option<Vec<String>>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub sealed: bool,
}

/// Accepts `["a","b"]`, `{"results":["a","b"]}` or `null`.
fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Plain(Vec<String>),
        Wrapped { results: Vec<String> },
    }
    Ok(Option::<Shape>::deserialize(d)?.map(|s| match s {
        Shape::Plain(v) | Shape::Wrapped { results: v } => v,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_schema_accepts_both_choice_shapes() {
        let plain: FieldSchema = serde_json::from_value(json!({
            "InternalName": "Estado",
            "TypeAsString": "Choice",
            "Choices": ["Activo", "Baja"]
        }))
        .unwrap();
        let wrapped: FieldSchema = serde_json::from_value(json!({
            "InternalName": "Estado",
            "TypeAsString": "Choice",
            "Choices": { "results": ["Activo", "Baja"] }
        }))
        .unwrap();
        assert_eq!(plain.choices, wrapped.choices);
        assert_eq!(plain.choices.as_deref(), Some(&["Activo".to_string(), "Baja".to_string()][..]));
    }

    #[test]
    fn row_id_reads_either_key() {
        let a: Row = serde_json::from_value(json!({ "ID": 7 })).unwrap();
        let b: Row = serde_json::from_value(json!({ "Id": "8" })).unwrap();
        let c: Row = serde_json::from_value(json!({ "Title": "x" })).unwrap();
        assert_eq!(row_id(&a), Some(7));
        assert_eq!(row_id(&b), Some(8));
        assert_eq!(row_id(&c), None);
    }
}
