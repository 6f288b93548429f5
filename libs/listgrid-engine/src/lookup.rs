use std::collections::{BTreeSet, HashMap};

use futures::future::try_join_all;
use listgrid_api::{FieldDescriptor, ListStore, LookupCell, LookupOption, Row};
use serde_json::Value;

use crate::error::GridError;

/// Items read from each lookup target list.
pub const LOOKUP_TOP: usize = 500;

/// `id → title` map of one lookup target list, plus the option list in
/// store order for pickers.
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    options: Vec<LookupOption>,
    titles: HashMap<i64, String>,
}

impl LookupTable {
    pub fn new(options: Vec<LookupOption>) -> Self {
        let titles = options.iter().map(|o| (o.key, o.text.clone())).collect();
        Self { options, titles }
    }

    pub fn title(&self, id: i64) -> Option<&str> {
        self.titles.get(&id).map(String::as_str)
    }

    /// Title for `id`, or the id itself when the target list has no entry.
    pub fn display(&self, id: i64) -> String {
        self.title(id).map(str::to_string).unwrap_or_else(|| id.to_string())
    }

    /// Reverse direction: first id whose title matches.
    pub fn id_of(&self, title: &str) -> Option<i64> {
        self.options.iter().find(|o| o.text == title).map(|o| o.key)
    }

    pub fn options(&self) -> &[LookupOption] {
        &self.options
    }
}

/// Tables for one resolution pass, keyed by target list id.
#[derive(Debug, Clone, Default)]
pub struct LookupTables {
    by_list: HashMap<String, LookupTable>,
}

impl LookupTables {
    pub fn insert(&mut self, list_id: impl Into<String>, table: LookupTable) {
        self.by_list.insert(list_id.into(), table);
    }

    pub fn for_field(&self, field: &FieldDescriptor) -> Option<&LookupTable> {
        field.lookup_list_id.as_deref().and_then(|id| self.by_list.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_list.is_empty()
    }
}

/// Options of one lookup target list.
pub async fn lookup_options(
    store: &dyn ListStore,
    list_id: &str,
) -> Result<Vec<LookupOption>, GridError> {
    store
        .lookup_items(list_id, LOOKUP_TOP)
        .await
        .map_err(|e| GridError::Store(e.with_context(format!("lookup list '{list_id}'"))))
}

/// Fetch every distinct target list referenced by `fields`, once each.
pub async fn fetch_tables(
    store: &dyn ListStore,
    fields: &[FieldDescriptor],
) -> Result<LookupTables, GridError> {
    let targets: BTreeSet<&str> = fields
        .iter()
        .filter(|f| f.kind.is_reference())
        .filter_map(|f| f.lookup_list_id.as_deref())
        .collect();

    let fetched = try_join_all(targets.into_iter().map(|list_id| async move {
        let options = lookup_options(store, list_id).await?;
        Ok::<_, GridError>((list_id.to_string(), LookupTable::new(options)))
    }))
    .await?;

    let mut tables = LookupTables::default();
    for (list_id, table) in fetched {
        tables.insert(list_id, table);
    }
    Ok(tables)
}

/// Replace every lookup/user cell with display text.
///
/// Multi-value fields always become an array of strings; single-value
/// fields become a string, or are removed when the row references nothing.
/// Resolved ids are kept under `<field>Id`, so applying twice is stable.
/// Fields without a fetched target list are left as the store sent them.
pub fn apply(mut rows: Vec<Row>, fields: &[FieldDescriptor], tables: &LookupTables) -> Vec<Row> {
    let lookups: Vec<(&FieldDescriptor, &LookupTable)> = fields
        .iter()
        .filter(|f| f.kind.is_reference())
        .filter_map(|f| Some((f, tables.for_field(f)?)))
        .collect();
    if lookups.is_empty() {
        return rows;
    }

    for row in rows.iter_mut() {
        for (field, table) in &lookups {
            let name = field.internal_name.as_str();
            let ids = LookupCell::decode(row, name).map(|c| c.ids()).unwrap_or_default();
            let id_key = format!("{name}Id");
            if field.allow_multiple {
                let titles = ids.iter().map(|id| Value::String(table.display(*id))).collect();
                row.insert(name.to_string(), Value::Array(titles));
                row.insert(id_key, Value::Array(ids.into_iter().map(Value::from).collect()));
            } else if let Some(id) = ids.first().copied() {
                row.insert(name.to_string(), Value::String(table.display(id)));
                row.insert(id_key, Value::from(id));
            } else {
                row.remove(name);
            }
        }
    }
    rows
}

/// Fetch the lookup tables `fields` need and apply them to `rows`.
pub async fn resolve(
    store: &dyn ListStore,
    rows: Vec<Row>,
    fields: &[FieldDescriptor],
) -> Result<Vec<Row>, GridError> {
    if rows.is_empty() || !fields.iter().any(|f| f.kind.is_reference()) {
        return Ok(rows);
    }
    let tables = fetch_tables(store, fields).await?;
    tracing::debug!(lists = tables.len(), rows = rows.len(), "resolving lookup text");
    Ok(apply(rows, fields, &tables))
}
