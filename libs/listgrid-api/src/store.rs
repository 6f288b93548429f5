use std::future::Future;
use std::pin::Pin;

use crate::caml::CamlView;
use crate::error::StoreError;
use crate::types::{FieldSchema, ItemProjection, ListInfo, LookupOption, Row, SiteList, ViewInfo};

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Remote list store. The engine only sees this trait, never a concrete
/// implementation.
///
/// Every call is attempted exactly once; implementations map their own
/// failures onto `ErrorKind` so callers can decide what to surface.
pub trait ListStore: Send + Sync {
    fn list_info(&self, list_id: &str) -> StoreFuture<'_, ListInfo>;

    /// Resolve a list by its display title.
    fn find_list(&self, title: &str) -> StoreFuture<'_, ListInfo>;

    fn site_lists(&self) -> StoreFuture<'_, Vec<SiteList>>;

    /// Stored query, row limit and schema markup of a view.
    /// Unknown view → `NotFound`.
    fn view(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, ViewInfo>;

    /// Structured field list of a view. Some hosts do not expose it; callers
    /// fall back to scanning `ViewInfo::html_schema_xml`.
    fn view_field_names(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, Vec<String>>;

    /// Field by internal name or title. Unresolvable → `NotFound`.
    fn field(&self, list_id: &str, name: &str) -> StoreFuture<'_, FieldSchema>;

    fn list_fields(&self, list_id: &str) -> StoreFuture<'_, Vec<FieldSchema>>;

    /// Up to `top` `(Id, Title)` pairs of a lookup target list.
    fn lookup_items(&self, list_id: &str, top: usize) -> StoreFuture<'_, Vec<LookupOption>>;

    /// Plain select of up to `top` items.
    fn items(&self, list_id: &str, select: &[String], top: usize) -> StoreFuture<'_, Vec<Row>>;

    /// Run a query document against a list. Rows are returned as delivered.
    fn query_items(&self, list_id: &str, query: &CamlView) -> StoreFuture<'_, Vec<Row>>;

    /// One item; expanded projections come back as `{Id, Title}` objects.
    fn item(&self, list_id: &str, id: i64, fields: &[ItemProjection]) -> StoreFuture<'_, Row>;

    /// Create an item, returning its id.
    fn add_item(&self, list_id: &str, payload: Row) -> StoreFuture<'_, i64>;

    fn update_item(&self, list_id: &str, id: i64, payload: Row) -> StoreFuture<'_, ()>;

    /// Move an item to the recycle bin.
    fn recycle_item(&self, list_id: &str, id: i64) -> StoreFuture<'_, ()>;

    /// Titles of the groups the current user belongs to.
    fn current_user_groups(&self) -> StoreFuture<'_, Vec<String>>;
}
