//! Grid/Schema projector: composes the pipeline into display grids, edit
//! schemas and item writes against one base list.

use std::sync::Arc;

use futures::try_join;
use listgrid_api::{
    FieldDescriptor, ItemProjection, ListInfo, ListStore, LookupOption, Row, SiteList,
};
use serde::Serialize;
use serde_json::Value;

use crate::edit::{EditControl, EditDraft, EditField, draft_from_item, update_payload};
use crate::error::GridError;
use crate::field_meta;
use crate::lookup;
use crate::predicate::build_equality;
use crate::query::{self, QuerySpec, ReadScope, projection_fields};
use crate::value::is_truthy;
use crate::view_fields;

/// Columns shown when they have to be guessed from row keys.
pub const MAX_INFERRED_COLUMNS: usize = 12;

// ════════════════════════════════════════════════════════════════
//  Output shapes
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridColumn {
    pub key: String,
    pub name: String,
    pub field_name: String,
    pub min_width: u32,
    pub is_resizable: bool,
}

impl GridColumn {
    pub fn new(internal_name: &str, title: &str) -> Self {
        Self {
            key: internal_name.to_string(),
            name: title.to_string(),
            field_name: internal_name.to_string(),
            min_width: 120,
            is_resizable: true,
        }
    }
}

impl From<&FieldDescriptor> for GridColumn {
    fn from(f: &FieldDescriptor) -> Self {
        GridColumn::new(&f.internal_name, &f.title)
    }
}

/// Display columns plus lookup-resolved rows of one list.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub list_id: String,
    pub columns: Vec<GridColumn>,
    pub rows: Vec<Row>,
    /// Descriptors behind `columns`; empty when columns were inferred.
    pub fields: Vec<FieldDescriptor>,
}

/// "Child rows where `child_field` equals the parent's value."
#[derive(Debug, Clone)]
pub struct RelatedQuery<'a> {
    pub child_list_id: &'a str,
    pub child_field: &'a str,
    pub parent_value: &'a Value,
}

/// Columns guessed from the first row's keys, skipping protocol noise.
pub fn infer_columns(rows: &[Row]) -> Vec<GridColumn> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };
    first
        .keys()
        .filter(|k| {
            !(k.to_ascii_lowercase().starts_with("odata")
                || k.eq_ignore_ascii_case("Id")
                || k.eq_ignore_ascii_case("GUID"))
        })
        .take(MAX_INFERRED_COLUMNS)
        .map(|k| GridColumn::new(k, k))
        .collect()
}

// ════════════════════════════════════════════════════════════════
//  ListGrid
// ════════════════════════════════════════════════════════════════

/// Grid operations bound to one base list. Holds no state between calls:
/// every load re-reads views, field metadata and lookup lists.
#[derive(Clone)]
pub struct ListGrid {
    store: Arc<dyn ListStore>,
    list_id: String,
}

impl ListGrid {
    pub fn new(store: Arc<dyn ListStore>, list_id: impl Into<String>) -> Self {
        Self { store, list_id: list_id.into() }
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn store(&self) -> &dyn ListStore {
        self.store.as_ref()
    }

    pub async fn meta(&self) -> Result<ListInfo, GridError> {
        Ok(self.store.list_info(&self.list_id).await?)
    }

    pub async fn view_field_names(&self, view_id: &str) -> Result<Vec<String>, GridError> {
        view_fields::view_field_names(self.store(), &self.list_id, view_id).await
    }

    pub async fn fields_meta(&self, names: &[String]) -> Result<Vec<FieldDescriptor>, GridError> {
        field_meta::fields_meta(self.store(), &self.list_id, names).await
    }

    /// Raw rows of a view, toggle field included in the projection.
    pub async fn rows_by_view(
        &self,
        view_id: &str,
        toggle_field: Option<&str>,
    ) -> Result<Vec<Row>, GridError> {
        let (names, view) = try_join!(self.view_field_names(view_id), self.view_info(view_id))?;
        let projection = with_toggle(names, toggle_field);
        let spec = QuerySpec {
            stored_query: view.view_query.as_deref(),
            projection: &projection,
            row_limit: view.row_limit,
            scope: ReadScope::Base,
            predicate: None,
        };
        query::run(self.store(), &self.list_id, &spec).await
    }

    /// Columns and lookup-resolved rows for a view of the base list.
    pub async fn view_grid(
        &self,
        view_id: &str,
        toggle_field: Option<&str>,
    ) -> Result<Grid, GridError> {
        let (names, view) = try_join!(self.view_field_names(view_id), self.view_info(view_id))?;
        let projection = with_toggle(names.clone(), toggle_field);
        let spec = QuerySpec {
            stored_query: view.view_query.as_deref(),
            projection: &projection,
            row_limit: view.row_limit,
            scope: ReadScope::Base,
            predicate: None,
        };

        let (fields, rows) = try_join!(
            self.fields_meta(&names),
            query::run(self.store(), &self.list_id, &spec)
        )?;
        let rows = lookup::resolve(self.store(), rows, &fields).await?;

        tracing::info!(list = %self.list_id, view = %view_id, columns = fields.len(), rows = rows.len(), "grid loaded");
        Ok(Grid {
            list_id: self.list_id.clone(),
            columns: fields.iter().map(GridColumn::from).collect(),
            rows,
            fields,
        })
    }

    /// Edit schema for `names`: descriptors plus the control each is edited
    /// with. Lookup pickers come with their target list's options.
    pub async fn edit_schema(&self, names: &[String]) -> Result<Vec<EditField>, GridError> {
        let fields = self.fields_meta(names).await?;
        let tables = lookup::fetch_tables(self.store(), &fields).await?;
        Ok(fields
            .into_iter()
            .map(|descriptor| {
                let options = tables.for_field(&descriptor).map(|t| t.options());
                let control = EditControl::for_field(&descriptor, options);
                EditField { descriptor, control }
            })
            .collect())
    }

    /// Current values of one item, shaped as a draft for `schema`.
    pub async fn item_values(
        &self,
        id: i64,
        schema: &[FieldDescriptor],
    ) -> Result<EditDraft, GridError> {
        let projection: Vec<ItemProjection> = schema
            .iter()
            .map(|f| {
                if f.kind.is_reference() {
                    ItemProjection::expanded(&f.internal_name)
                } else {
                    ItemProjection::plain(&f.internal_name)
                }
            })
            .collect();
        let item = self
            .store
            .item(&self.list_id, id, &projection)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("item {id}"))))?;
        Ok(draft_from_item(&item, schema))
    }

    pub async fn update_fields(
        &self,
        id: i64,
        schema: &[FieldDescriptor],
        draft: &EditDraft,
    ) -> Result<(), GridError> {
        let payload = update_payload(schema, draft)?;
        tracing::debug!(list = %self.list_id, id, fields = payload.len(), "updating item");
        self.store
            .update_item(&self.list_id, id, payload)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("item {id}"))))
    }

    pub async fn add_item(
        &self,
        schema: &[FieldDescriptor],
        draft: &EditDraft,
    ) -> Result<i64, GridError> {
        let payload = update_payload(schema, draft)?;
        let id = self.store.add_item(&self.list_id, payload).await?;
        tracing::info!(list = %self.list_id, id, "item added");
        Ok(id)
    }

    pub async fn set_boolean(&self, id: i64, field: &str, value: bool) -> Result<(), GridError> {
        let mut payload = Row::new();
        payload.insert(field.to_string(), Value::Bool(value));
        self.store
            .update_item(&self.list_id, id, payload)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("item {id}"))))
    }

    /// Flip a boolean field; returns the value written.
    pub async fn toggle(&self, id: i64, field: &str) -> Result<bool, GridError> {
        let item = self
            .store
            .item(&self.list_id, id, &[ItemProjection::plain(field)])
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("item {id}"))))?;
        let next = !item.get(field).is_some_and(is_truthy);
        self.set_boolean(id, field, next).await?;
        Ok(next)
    }

    pub async fn recycle(&self, id: i64) -> Result<(), GridError> {
        self.store
            .recycle_item(&self.list_id, id)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("item {id}"))))?;
        tracing::info!(list = %self.list_id, id, "item recycled");
        Ok(())
    }

    pub async fn lookup_options(&self, list_id: &str) -> Result<Vec<LookupOption>, GridError> {
        lookup::lookup_options(self.store(), list_id).await
    }

    /// Child rows matching the parent value, shaped by a child view: the
    /// view's stored filter AND the equality predicate.
    pub async fn related_grid_by_view(
        &self,
        related: &RelatedQuery<'_>,
        child_view_id: &str,
    ) -> Result<Grid, GridError> {
        let list = related.child_list_id;
        let store = self.store();
        let (view, names, child_field) = try_join!(
            async {
                store
                    .view(list, child_view_id)
                    .await
                    .map_err(|e| GridError::Store(e.with_context(format!("view '{child_view_id}'"))))
            },
            view_fields::view_field_names(store, list, child_view_id),
            child_descriptor(store, list, related.child_field)
        )?;

        let names = projection_fields(&names);
        let predicate = build_equality(&child_field.internal_name, &child_field.kind, related.parent_value)?
            .into_predicate();
        let spec = QuerySpec {
            stored_query: view.view_query.as_deref(),
            projection: &names,
            row_limit: view.row_limit,
            scope: ReadScope::Related,
            predicate: Some(predicate),
        };

        let (fields, rows) = try_join!(
            field_meta::fields_meta(store, list, &names),
            query::run(store, list, &spec)
        )?;
        let rows = lookup::resolve(store, rows, &fields).await?;

        tracing::info!(list = %list, view = %child_view_id, rows = rows.len(), "related grid loaded");
        Ok(Grid {
            list_id: list.to_string(),
            columns: fields.iter().map(GridColumn::from).collect(),
            rows,
            fields,
        })
    }

    /// Child rows matching the parent value, no view: columns are inferred
    /// from the first row.
    pub async fn related_items(&self, related: &RelatedQuery<'_>) -> Result<Grid, GridError> {
        let list = related.child_list_id;
        let child_field = child_descriptor(self.store(), list, related.child_field).await?;
        let predicate = build_equality(&child_field.internal_name, &child_field.kind, related.parent_value)?
            .into_predicate();
        let spec = QuerySpec {
            stored_query: None,
            projection: &[],
            row_limit: None,
            scope: ReadScope::Related,
            predicate: Some(predicate),
        };
        let mut view = query::assemble(&spec)?;
        view.view_fields.clear();

        tracing::debug!(list = %list, caml = %view.to_xml(), "running related query");
        let rows = self
            .store
            .query_items(list, &view)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("list '{list}'"))))?;
        Ok(Grid {
            list_id: list.to_string(),
            columns: infer_columns(&rows),
            rows,
            fields: Vec::new(),
        })
    }

    /// Lists a user can pick: hidden ones are left out.
    pub async fn site_lists(&self) -> Result<Vec<SiteList>, GridError> {
        let lists = self.store.site_lists().await?;
        Ok(lists.into_iter().filter(|l| !l.hidden).collect())
    }

    pub async fn list_fields(&self, list_id: &str) -> Result<Vec<FieldDescriptor>, GridError> {
        field_meta::visible_fields(self.store(), list_id).await
    }

    /// Whether the current user belongs to `group` (title, any case).
    pub async fn user_in_group(&self, group: &str) -> Result<bool, GridError> {
        let groups = self.store.current_user_groups().await?;
        let target = group.to_lowercase();
        Ok(groups.iter().any(|g| g.to_lowercase() == target))
    }

    async fn view_info(&self, view_id: &str) -> Result<listgrid_api::ViewInfo, GridError> {
        self.store
            .view(&self.list_id, view_id)
            .await
            .map_err(|e| GridError::Store(e.with_context(format!("view '{view_id}'"))))
    }
}

impl std::fmt::Debug for ListGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListGrid").field("list_id", &self.list_id).finish_non_exhaustive()
    }
}

fn with_toggle(mut names: Vec<String>, toggle_field: Option<&str>) -> Vec<String> {
    if let Some(t) = toggle_field.filter(|t| !t.is_empty()) {
        if !names.iter().any(|n| n == t) {
            names.push(t.to_string());
        }
    }
    names
}

async fn child_descriptor(
    store: &dyn ListStore,
    list_id: &str,
    field: &str,
) -> Result<FieldDescriptor, GridError> {
    store
        .field(list_id, field)
        .await
        .map(FieldDescriptor::from)
        .map_err(|e| GridError::Store(e.with_context(format!("field '{field}'"))))
}
