use serde::{Deserialize, Serialize};

use crate::types::FieldSchema;

// ════════════════════════════════════════════════════════════════
//  Field Kind
// ════════════════════════════════════════════════════════════════

/// Field type after dispatch. Parsed case-insensitively from the store's
/// type name; anything unrecognized is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum FieldKind {
    Text,
    Number,
    Currency,
    Boolean,
    DateTime,
    Choice,
    MultiChoice,
    Lookup,
    User,
    Other(String),
}

impl FieldKind {
    pub fn parse(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "text" | "note" => FieldKind::Text,
            "number" | "integer" => FieldKind::Number,
            "currency" => FieldKind::Currency,
            "boolean" => FieldKind::Boolean,
            "datetime" => FieldKind::DateTime,
            "choice" => FieldKind::Choice,
            "multichoice" => FieldKind::MultiChoice,
            "lookup" | "lookupmulti" => FieldKind::Lookup,
            "user" | "usermulti" => FieldKind::User,
            _ => FieldKind::Other(type_name.to_string()),
        }
    }

    /// Lookup and user fields reference rows of another list by numeric id.
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Lookup | FieldKind::User)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldKind::Number | FieldKind::Currency)
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Text => f.write_str("Text"),
            FieldKind::Number => f.write_str("Number"),
            FieldKind::Currency => f.write_str("Currency"),
            FieldKind::Boolean => f.write_str("Boolean"),
            FieldKind::DateTime => f.write_str("DateTime"),
            FieldKind::Choice => f.write_str("Choice"),
            FieldKind::MultiChoice => f.write_str("MultiChoice"),
            FieldKind::Lookup => f.write_str("Lookup"),
            FieldKind::User => f.write_str("User"),
            FieldKind::Other(name) => f.write_str(name),
        }
    }
}

impl From<String> for FieldKind {
    fn from(s: String) -> Self {
        FieldKind::parse(&s)
    }
}

impl From<FieldKind> for String {
    fn from(k: FieldKind) -> Self {
        k.to_string()
    }
}

// ════════════════════════════════════════════════════════════════
//  Field Descriptor
// ════════════════════════════════════════════════════════════════

/// Typed description of one field. Fetched fresh on every grid load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub internal_name: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    pub required: bool,
    pub read_only: bool,
    pub allow_multiple: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookup_list_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

impl FieldDescriptor {
    /// Shortcut: plain text field, used mostly by tests and fixtures.
    pub fn text(internal_name: impl Into<String>) -> Self {
        let internal_name = internal_name.into();
        Self {
            title: internal_name.clone(),
            internal_name,
            kind: FieldKind::Text,
            required: false,
            read_only: false,
            allow_multiple: false,
            lookup_list_id: None,
            choices: None,
        }
    }
}

impl From<FieldSchema> for FieldDescriptor {
    fn from(f: FieldSchema) -> Self {
        let multi_type = f.type_as_string.to_ascii_lowercase().ends_with("multi");
        let kind = FieldKind::parse(&f.type_as_string);
        let title = if f.title.is_empty() { f.internal_name.clone() } else { f.title };
        Self {
            internal_name: f.internal_name,
            title,
            kind,
            required: f.required,
            read_only: f.read_only_field,
            allow_multiple: f.allow_multiple_values || multi_type,
            lookup_list_id: f.lookup_list.filter(|s| !s.trim().is_empty()),
            choices: f.choices,
        }
    }
}
