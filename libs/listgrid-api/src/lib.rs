pub mod caml;
pub mod error;
pub mod lookup;
pub mod schema;
pub mod store;
pub mod types;

pub use caml::{
    CamlQuery, CamlValue, CamlView, CompareOp, FieldRef, OrderBy, OrderField, Predicate,
    ValueContent, escape_xml,
};
pub use error::{ErrorKind, StoreError};
pub use lookup::{LookupCell, LookupRef};
pub use schema::{FieldDescriptor, FieldKind};
pub use store::{ListStore, StoreFuture};
pub use types::{
    FieldSchema, ItemProjection, ListInfo, LookupOption, Row, SiteList, ViewInfo, row_id,
};
