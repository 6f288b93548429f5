use futures::future::try_join_all;
use listgrid_api::{FieldDescriptor, ListStore};

use crate::error::GridError;

/// Descriptors for `names`, in request order.
///
/// One fetch per name, all issued together; the first failure fails the
/// whole batch.
pub async fn fields_meta(
    store: &dyn ListStore,
    list_id: &str,
    names: &[String],
) -> Result<Vec<FieldDescriptor>, GridError> {
    let fetches = names.iter().map(|name| async move {
        store
            .field(list_id, name)
            .await
            .map(FieldDescriptor::from)
            .map_err(|e| GridError::Store(e.with_context(format!("field '{name}'"))))
    });
    let fields = try_join_all(fetches).await?;
    tracing::debug!(list = %list_id, fields = fields.len(), "resolved field metadata");
    Ok(fields)
}

/// Fields of a list a user can meaningfully pick: neither hidden nor sealed.
pub async fn visible_fields(
    store: &dyn ListStore,
    list_id: &str,
) -> Result<Vec<FieldDescriptor>, GridError> {
    let fields = store.list_fields(list_id).await?;
    Ok(fields
        .into_iter()
        .filter(|f| !f.hidden && !f.sealed)
        .map(FieldDescriptor::from)
        .collect())
}
