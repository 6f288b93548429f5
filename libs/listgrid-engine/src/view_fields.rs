use std::sync::OnceLock;

use listgrid_api::{ErrorKind, ListStore};
use regex::Regex;

use crate::error::GridError;

/// Fields a view may list that are never shown as grid columns.
pub const SYSTEM_FIELDS: [&str; 10] = [
    "ID",
    "ContentType",
    "Attachments",
    "Modified",
    "Editor",
    "Created",
    "Author",
    "_UIVersionString",
    "FileSystemObjectType",
    "ContentTypeId",
];

/// `LinkTitle`, `LinkTitleNoMenu`, ... all surface the internal `Title` field.
pub fn normalize_field_name(name: &str) -> &str {
    if name.get(..9).is_some_and(|p| p.eq_ignore_ascii_case("LinkTitle")) {
        "Title"
    } else {
        name
    }
}

/// Drop system fields, normalize title surrogates, keep first occurrences.
pub fn clean_field_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || SYSTEM_FIELDS.contains(&name) {
            continue;
        }
        let name = normalize_field_name(name);
        if !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn field_ref_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"FieldRef\s+Name="([^"]+)""#).ok()).as_ref()
}

/// Field names referenced by `FieldRef Name="..."` in view schema markup.
pub fn scan_schema_markup(markup: &str) -> Vec<String> {
    let Some(re) = field_ref_pattern() else { return Vec::new() };
    re.captures_iter(markup).map(|c| c[1].to_string()).collect()
}

/// Ordered internal names of the fields a view displays.
///
/// Uses the store's structured field list; if that call fails or comes
/// back empty, scans the view's schema markup instead. Only an unknown
/// view is an error.
pub async fn view_field_names(
    store: &dyn ListStore,
    list_id: &str,
    view_id: &str,
) -> Result<Vec<String>, GridError> {
    match store.view_field_names(list_id, view_id).await {
        Ok(names) if !names.is_empty() => return Ok(clean_field_names(names)),
        Ok(_) => {
            tracing::debug!(list = %list_id, view = %view_id, "structured view fields empty, scanning schema");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(GridError::Store(e.with_context(format!("view '{view_id}'"))));
        }
        Err(e) => {
            tracing::debug!(list = %list_id, view = %view_id, error = %e, "structured view fields unavailable, scanning schema");
        }
    }

    let info = store
        .view(list_id, view_id)
        .await
        .map_err(|e| GridError::Store(e.with_context(format!("view '{view_id}'"))))?;
    let markup = info.html_schema_xml.unwrap_or_default();
    Ok(clean_field_names(scan_schema_markup(&markup)))
}
