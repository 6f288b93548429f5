//! View-driven list grids: field discovery, typed query assembly, lookup
//! resolution and edit payloads on top of a [`listgrid_api::ListStore`].

pub mod config;
pub mod edit;
pub mod error;
pub mod field_meta;
pub mod grid;
pub mod lookup;
pub mod predicate;
pub mod query;
pub mod status;
pub mod value;
pub mod view_fields;

pub use config::{GridConfig, ListGridConfig, RelatedConfig, StatusConfig, StoreConfig};
pub use edit::{EditControl, EditDraft, EditField, EditValue, LookupPick};
pub use error::GridError;
pub use grid::{Grid, GridColumn, ListGrid, RelatedQuery};
pub use lookup::{LookupTable, LookupTables};
pub use predicate::{Equality, build_equality};
pub use query::{QuerySpec, ReadScope};
pub use status::{ExpiryStatus, StatusPolicy, StatusRules};
