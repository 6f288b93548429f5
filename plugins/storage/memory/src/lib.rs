//! In-process list store. Evaluates query documents against rows held in
//! memory; used by tests and by the demo configuration.

mod eval;

use std::collections::{BTreeMap, HashMap, HashSet};

use listgrid_api::{
    CamlView, FieldSchema, ItemProjection, ListInfo, ListStore, LookupOption, Row, SiteList,
    StoreError, StoreFuture, ViewInfo, row_id,
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::eval::{FieldLookup, matches, reference_ids, sort_rows};

// ═══════════════════════════════════════════════════════════════
//  MemoryStorageConfig
// ═══════════════════════════════════════════════════════════════

/// Seed data, usually the `[store.settings]` table of the binary's config.
#[derive(Debug, Default, serde::Deserialize)]
pub struct MemoryStorageConfig {
    #[serde(default)]
    pub user_groups: Vec<String>,
    #[serde(default)]
    pub lists: Vec<ListSeed>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ListSeed {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub fields: Vec<FieldSeed>,
    #[serde(default)]
    pub views: Vec<ViewSeed>,
    #[serde(default)]
    pub items: Vec<Row>,
}

#[derive(Debug, serde::Deserialize)]
pub struct FieldSeed {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(rename = "type", default = "default_field_type")]
    pub type_name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub lookup_list: Option<String>,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

fn default_field_type() -> String {
    "Text".into()
}

impl From<FieldSeed> for FieldSchema {
    fn from(s: FieldSeed) -> Self {
        FieldSchema {
            title: s.title.unwrap_or_else(|| s.name.clone()),
            internal_name: s.name,
            type_as_string: s.type_name,
            required: s.required,
            read_only_field: s.read_only,
            lookup_list: s.lookup_list,
            allow_multiple_values: s.multiple,
            choices: s.choices,
            hidden: s.hidden,
            sealed: false,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
pub struct ViewSeed {
    pub id: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub row_limit: Option<i64>,
}

// ═══════════════════════════════════════════════════════════════
//  Lists
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct MemoryView {
    pub field_names: Vec<String>,
    pub query: Option<String>,
    pub row_limit: Option<i64>,
}

impl MemoryView {
    pub fn new<S: Into<String>>(field_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            field_names: field_names.into_iter().map(Into::into).collect(),
            query: None,
            row_limit: None,
        }
    }

    pub fn query(mut self, body: impl Into<String>) -> Self {
        self.query = Some(body.into());
        self
    }

    pub fn row_limit(mut self, limit: i64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    /// Schema markup listing the view's fields, as a host would render it.
    fn schema_markup(&self) -> String {
        let refs: String = self
            .field_names
            .iter()
            .map(|n| format!("<FieldRef Name=\"{n}\" />"))
            .collect();
        format!("<View><ViewFields>{refs}</ViewFields></View>")
    }
}

/// One list: schema, views and items. Lookup values are stored the way the
/// remote host stores them, as ids under `<field>Id`.
#[derive(Debug, Clone)]
pub struct MemoryList {
    pub id: String,
    pub title: String,
    pub hidden: bool,
    fields: Vec<FieldSchema>,
    views: BTreeMap<String, MemoryView>,
    items: Vec<Row>,
    next_id: i64,
}

impl MemoryList {
    /// New list with the built-in `ID` and `Title` fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        let builtin = |name: &str, ty: &str, read_only: bool| FieldSchema {
            internal_name: name.to_string(),
            title: name.to_string(),
            type_as_string: ty.to_string(),
            read_only_field: read_only,
            ..FieldSchema::default()
        };
        Self {
            id: id.into(),
            title: title.into(),
            hidden: false,
            fields: vec![builtin("ID", "Counter", true), builtin("Title", "Text", false)],
            views: BTreeMap::new(),
            items: Vec::new(),
            next_id: 1,
        }
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Add a field; a field with the same internal name is replaced.
    pub fn field(mut self, schema: FieldSchema) -> Self {
        self.fields.retain(|f| f.internal_name != schema.internal_name);
        self.fields.push(schema);
        self
    }

    pub fn text(self, name: &str) -> Self {
        self.typed(name, "Text")
    }

    pub fn typed(self, name: &str, type_name: &str) -> Self {
        self.field(FieldSchema {
            internal_name: name.to_string(),
            title: name.to_string(),
            type_as_string: type_name.to_string(),
            ..FieldSchema::default()
        })
    }

    pub fn lookup(self, name: &str, target_list: &str, multiple: bool) -> Self {
        self.field(FieldSchema {
            internal_name: name.to_string(),
            title: name.to_string(),
            type_as_string: if multiple { "LookupMulti" } else { "Lookup" }.to_string(),
            lookup_list: Some(target_list.to_string()),
            allow_multiple_values: multiple,
            ..FieldSchema::default()
        })
    }

    pub fn view(mut self, id: impl Into<String>, view: MemoryView) -> Self {
        self.views.insert(id.into(), view);
        self
    }

    /// Append an item; `ID` is assigned when missing.
    pub fn item(mut self, row: Row) -> Self {
        self.insert(row);
        self
    }

    fn insert(&mut self, mut row: Row) -> i64 {
        let id = match row_id(&row) {
            Some(id) => id,
            None => self.next_id,
        };
        self.next_id = self.next_id.max(id + 1);
        row.remove("Id");
        row.insert("ID".to_string(), Value::from(id));
        self.items.push(normalize_payload(row));
        id
    }

    fn find_field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|f| f.internal_name == name)
            .or_else(|| self.fields.iter().find(|f| f.title.eq_ignore_ascii_case(name)))
    }

    fn item_mut(&mut self, id: i64) -> Option<&mut Row> {
        self.items.iter_mut().find(|r| row_id(r) == Some(id))
    }
}

impl From<ListSeed> for MemoryList {
    fn from(seed: ListSeed) -> Self {
        let mut list = MemoryList::new(seed.id, seed.title);
        list.hidden = seed.hidden;
        for f in seed.fields {
            list = list.field(f.into());
        }
        for v in seed.views {
            list.views.insert(
                v.id,
                MemoryView { field_names: v.fields, query: v.query, row_limit: v.row_limit },
            );
        }
        for item in seed.items {
            list.insert(item);
        }
        list
    }
}

/// `{results: [...]}` wrappers become plain arrays.
fn normalize_payload(row: Row) -> Row {
    row.into_iter()
        .map(|(k, v)| match v {
            Value::Object(mut map) if map.len() == 1 && map.contains_key("results") => {
                (k, map.remove("results").unwrap_or(Value::Null))
            }
            other => (k, other),
        })
        .collect()
}

fn is_reference_type(schema: &FieldSchema) -> bool {
    let ty = schema.type_as_string.to_ascii_lowercase();
    ty.starts_with("lookup") || ty.starts_with("user")
}

// ═══════════════════════════════════════════════════════════════
//  MemoryListStore
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct State {
    lists: BTreeMap<String, MemoryList>,
    user_groups: Vec<String>,
    structured_view_fields_disabled: bool,
    failing_fields: HashSet<(String, String)>,
    executed_queries: Vec<String>,
    lookup_fetches: HashMap<String, usize>,
}

impl State {
    fn list(&self, list_id: &str) -> Result<&MemoryList, StoreError> {
        self.lists
            .get(list_id)
            .ok_or_else(|| StoreError::not_found(format!("list '{list_id}' does not exist")))
    }

    fn list_mut(&mut self, list_id: &str) -> Result<&mut MemoryList, StoreError> {
        self.lists
            .get_mut(list_id)
            .ok_or_else(|| StoreError::not_found(format!("list '{list_id}' does not exist")))
    }
}

/// Evaluation context: one list plus every list its lookups point to.
struct ListContext<'a> {
    state: &'a State,
    list: &'a MemoryList,
}

impl FieldLookup for ListContext<'_> {
    fn is_reference(&self, field: &str) -> bool {
        self.list.find_field(field).is_some_and(is_reference_type)
    }

    fn reference_title(&self, field: &str, id: i64) -> Option<String> {
        let target = self.list.find_field(field)?.lookup_list.as_deref()?;
        let target = self.state.lists.get(target)?;
        target
            .items
            .iter()
            .find(|r| row_id(r) == Some(id))
            .and_then(|r| r.get("Title"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// In-memory `ListStore`.
pub struct MemoryListStore {
    state: RwLock<State>,
}

impl Default for MemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self { state: RwLock::new(State::default()) }
    }

    pub fn from_config(config: MemoryStorageConfig) -> Self {
        let mut store = Self::new().with_user_groups(config.user_groups);
        for seed in config.lists {
            store = store.with_list(seed.into());
        }
        store
    }

    pub fn with_list(mut self, list: MemoryList) -> Self {
        self.state.get_mut().lists.insert(list.id.clone(), list);
        self
    }

    pub fn with_user_groups<S: Into<String>>(mut self, groups: impl IntoIterator<Item = S>) -> Self {
        self.state.get_mut().user_groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Make the structured view field list unavailable, as some hosts do.
    pub fn without_structured_view_fields(mut self) -> Self {
        self.state.get_mut().structured_view_fields_disabled = true;
        self
    }

    /// Make metadata reads of one field fail with a transient error.
    pub fn with_failing_field(mut self, list_id: &str, field: &str) -> Self {
        self.state
            .get_mut()
            .failing_fields
            .insert((list_id.to_string(), field.to_string()));
        self
    }

    /// Query documents executed so far, serialized.
    pub async fn executed_queries(&self) -> Vec<String> {
        self.state.read().await.executed_queries.clone()
    }

    /// How many times a lookup target list was read.
    pub async fn lookup_fetches(&self, list_id: &str) -> usize {
        self.state.read().await.lookup_fetches.get(list_id).copied().unwrap_or(0)
    }

    /// Current stored row of an item.
    pub async fn stored_item(&self, list_id: &str, id: i64) -> Option<Row> {
        let state = self.state.read().await;
        let list = state.lists.get(list_id)?;
        list.items.iter().find(|r| row_id(r) == Some(id)).cloned()
    }
}

/// Copy `name` (or `<name>Id` for references) from `row` into `out`.
fn project_field(list: &MemoryList, row: &Row, name: &str, out: &mut Row) {
    let reference = list.find_field(name).is_some_and(is_reference_type);
    let key = if reference { format!("{name}Id") } else { name.to_string() };
    if let Some(v) = row.get(&key) {
        out.insert(key, v.clone());
    }
}

impl ListStore for MemoryListStore {
    fn list_info(&self, list_id: &str) -> StoreFuture<'_, ListInfo> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let list = state.list(&list_id)?;
            Ok(ListInfo { id: list.id.clone(), title: list.title.clone() })
        })
    }

    fn find_list(&self, title: &str) -> StoreFuture<'_, ListInfo> {
        let title = title.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            state
                .lists
                .values()
                .find(|l| l.title.eq_ignore_ascii_case(&title))
                .map(|l| ListInfo { id: l.id.clone(), title: l.title.clone() })
                .ok_or_else(|| StoreError::not_found(format!("list titled '{title}' does not exist")))
        })
    }

    fn site_lists(&self) -> StoreFuture<'_, Vec<SiteList>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .lists
                .values()
                .map(|l| SiteList { id: l.id.clone(), title: l.title.clone(), hidden: l.hidden })
                .collect())
        })
    }

    fn view(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, ViewInfo> {
        let list_id = list_id.to_string();
        let view_id = view_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let view = state
                .list(&list_id)?
                .views
                .get(&view_id)
                .ok_or_else(|| StoreError::not_found(format!("view '{view_id}' does not exist")))?;
            Ok(ViewInfo {
                view_query: view.query.clone(),
                row_limit: view.row_limit,
                html_schema_xml: Some(view.schema_markup()),
            })
        })
    }

    fn view_field_names(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, Vec<String>> {
        let list_id = list_id.to_string();
        let view_id = view_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            let view = state
                .list(&list_id)?
                .views
                .get(&view_id)
                .ok_or_else(|| StoreError::not_found(format!("view '{view_id}' does not exist")))?;
            if state.structured_view_fields_disabled {
                return Err(StoreError::transient("view field list not exposed by this host"));
            }
            Ok(view.field_names.clone())
        })
    }

    fn field(&self, list_id: &str, name: &str) -> StoreFuture<'_, FieldSchema> {
        let list_id = list_id.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            if state.failing_fields.contains(&(list_id.clone(), name.clone())) {
                return Err(StoreError::transient(format!("field '{name}' read failed")));
            }
            state
                .list(&list_id)?
                .find_field(&name)
                .cloned()
                .ok_or_else(|| StoreError::not_found(format!("field '{name}' does not exist")))
        })
    }

    fn list_fields(&self, list_id: &str) -> StoreFuture<'_, Vec<FieldSchema>> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state.list(&list_id)?.fields.clone())
        })
    }

    fn lookup_items(&self, list_id: &str, top: usize) -> StoreFuture<'_, Vec<LookupOption>> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            *state.lookup_fetches.entry(list_id.clone()).or_default() += 1;
            let list = state.list(&list_id)?;
            Ok(list
                .items
                .iter()
                .take(top)
                .filter_map(|r| {
                    let key = row_id(r)?;
                    let text = r.get("Title").and_then(Value::as_str).unwrap_or_default().to_string();
                    Some(LookupOption { key, text })
                })
                .collect())
        })
    }

    fn items(&self, list_id: &str, select: &[String], top: usize) -> StoreFuture<'_, Vec<Row>> {
        let list_id = list_id.to_string();
        let select = select.to_vec();
        Box::pin(async move {
            let state = self.state.read().await;
            let list = state.list(&list_id)?;
            Ok(list
                .items
                .iter()
                .take(top)
                .map(|r| {
                    let mut out = Row::new();
                    for name in &select {
                        if name == "Id" {
                            if let Some(id) = row_id(r) {
                                out.insert("Id".to_string(), Value::from(id));
                            }
                        } else {
                            project_field(list, r, name, &mut out);
                        }
                    }
                    out
                })
                .collect())
        })
    }

    fn query_items(&self, list_id: &str, query: &CamlView) -> StoreFuture<'_, Vec<Row>> {
        let list_id = list_id.to_string();
        let query = query.clone();
        Box::pin(async move {
            let mut state = self.state.write().await;
            state.executed_queries.push(query.to_xml());

            let list = state.list(&list_id)?;
            let ctx = ListContext { state: &*state, list };
            let mut rows = Vec::new();
            for row in &list.items {
                let keep = match &query.query.filter {
                    Some(pred) => matches(pred, row, &ctx)?,
                    None => true,
                };
                if keep {
                    rows.push(row.clone());
                }
            }
            if let Some(order_by) = &query.query.order_by {
                sort_rows(&mut rows, order_by, &ctx);
            }
            rows.truncate(query.row_limit as usize);

            let projected = rows
                .iter()
                .map(|row| {
                    let mut out = Row::new();
                    if let Some(id) = row_id(row) {
                        out.insert("ID".to_string(), Value::from(id));
                        out.insert("Id".to_string(), Value::from(id));
                    }
                    if query.view_fields.is_empty() {
                        for (k, v) in row {
                            out.entry(k.clone()).or_insert_with(|| v.clone());
                        }
                    } else {
                        for name in &query.view_fields {
                            project_field(list, row, name, &mut out);
                        }
                    }
                    out
                })
                .collect();
            Ok(projected)
        })
    }

    fn item(&self, list_id: &str, id: i64, fields: &[ItemProjection]) -> StoreFuture<'_, Row> {
        let list_id = list_id.to_string();
        let fields = fields.to_vec();
        Box::pin(async move {
            let state = self.state.read().await;
            let list = state.list(&list_id)?;
            let row = list
                .items
                .iter()
                .find(|r| row_id(r) == Some(id))
                .ok_or_else(|| StoreError::not_found(format!("item {id} does not exist")))?;
            let ctx = ListContext { state: &*state, list };

            let mut out = Row::new();
            out.insert("Id".to_string(), Value::from(id));
            for f in &fields {
                if !f.expand {
                    project_field(list, row, &f.name, &mut out);
                    continue;
                }
                let refs: Vec<Value> = reference_ids(row, &f.name)
                    .into_iter()
                    .map(|rid| {
                        let title = ctx.reference_title(&f.name, rid).unwrap_or_default();
                        serde_json::json!({ "Id": rid, "Title": title })
                    })
                    .collect();
                let multi = list.find_field(&f.name).is_some_and(|s| s.allow_multiple_values);
                let value = if multi {
                    Value::Array(refs)
                } else {
                    refs.into_iter().next().unwrap_or(Value::Null)
                };
                out.insert(f.name.clone(), value);
            }
            Ok(out)
        })
    }

    fn add_item(&self, list_id: &str, payload: Row) -> StoreFuture<'_, i64> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let list = state.list_mut(&list_id)?;
            let mut row = payload;
            row.remove("ID");
            row.remove("Id");
            Ok(list.insert(row))
        })
    }

    fn update_item(&self, list_id: &str, id: i64, payload: Row) -> StoreFuture<'_, ()> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let item = state
                .list_mut(&list_id)?
                .item_mut(id)
                .ok_or_else(|| StoreError::not_found(format!("item {id} does not exist")))?;
            for (k, v) in normalize_payload(payload) {
                if k != "ID" && k != "Id" {
                    item.insert(k, v);
                }
            }
            Ok(())
        })
    }

    fn recycle_item(&self, list_id: &str, id: i64) -> StoreFuture<'_, ()> {
        let list_id = list_id.to_string();
        Box::pin(async move {
            let mut state = self.state.write().await;
            let list = state.list_mut(&list_id)?;
            let before = list.items.len();
            list.items.retain(|r| row_id(r) != Some(id));
            if list.items.len() == before {
                return Err(StoreError::not_found(format!("item {id} does not exist")));
            }
            Ok(())
        })
    }

    fn current_user_groups(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move { Ok(self.state.read().await.user_groups.clone()) })
    }
}
