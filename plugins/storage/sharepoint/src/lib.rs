//! List store backed by the SharePoint REST API.

mod odata;

use listgrid_api::{
    CamlView, FieldSchema, ItemProjection, ListInfo, ListStore, LookupOption, Row, SiteList,
    StoreError, StoreFuture, ViewInfo,
};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::odata::{collection, guid, normalize, status_error, string_literal};

const FIELD_SELECT: &str = "InternalName,Title,TypeAsString,Required,ReadOnlyField,LookupList,AllowMultipleValues,Choices,Hidden,Sealed";
const ACCEPT: &str = "application/json;odata=nometadata";

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SharePointConfig {
    /// Site root, e.g. `https://contoso.sharepoint.com/sites/flota`.
    pub site_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

// ═══════════════════════════════════════════════════════════════
//  SharePointStore
// ═══════════════════════════════════════════════════════════════

pub struct SharePointStore {
    http: reqwest::Client,
    api: String,
    token: Option<String>,
}

impl SharePointStore {
    pub fn new(config: &SharePointConfig) -> Result<Self, StoreError> {
        let site = config.site_url.trim().trim_end_matches('/');
        if !(site.starts_with("https://") || site.starts_with("http://")) {
            return Err(StoreError::config(format!("site_url must be an http(s) URL, got '{site}'")));
        }
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| StoreError::config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api: format!("{site}/_api/web"),
            token: config.access_token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self
            .http
            .request(method, format!("{}/{path}", self.api))
            .header(reqwest::header::ACCEPT, ACCEPT);
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Send, check the status and return the normalized JSON body
    /// (`Null` for empty bodies).
    async fn exec(&self, req: RequestBuilder) -> Result<Value, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::transient(format!("SharePoint request: {e}")))?;

        let status = resp.status();
        let url = resp.url().path().to_string();
        let body = resp
            .text()
            .await
            .map_err(|e| StoreError::transient(format!("SharePoint read: {e}")))?;

        if !status.is_success() {
            tracing::warn!(%status, path = %url, "SharePoint request failed");
            return Err(status_error(status, &body));
        }
        tracing::debug!(%status, path = %url, bytes = body.len(), "SharePoint response");
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&body)?;
        Ok(normalize(value))
    }

    async fn get<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, StoreError> {
        let value = self.exec(req).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_collection<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Vec<T>, StoreError> {
        let items = collection(self.exec(req).await?)?;
        items
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    fn list_path(list_id: &str) -> String {
        format!("lists(guid'{}')", guid(list_id))
    }

    fn view_path(list_id: &str, view_id: &str) -> String {
        format!("{}/views(guid'{}')", Self::list_path(list_id), guid(view_id))
    }
}

/// `$select` and `$expand` for one item: expanded fields read `Id` and `Title`
/// of the referenced rows.
fn item_query(fields: &[ItemProjection]) -> (String, String) {
    let mut select = vec!["Id".to_string()];
    let mut expand = Vec::new();
    for f in fields {
        if f.expand {
            select.push(format!("{}/Id", f.name));
            select.push(format!("{}/Title", f.name));
            expand.push(f.name.clone());
        } else {
            select.push(f.name.clone());
        }
    }
    (select.join(","), expand.join(","))
}

#[derive(serde::Deserialize)]
struct IdTitle {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Title", default)]
    title: Option<String>,
}

#[derive(serde::Deserialize)]
struct GroupTitle {
    #[serde(rename = "Title", default)]
    title: String,
}

#[derive(serde::Deserialize)]
struct ViewFieldsResponse {
    #[serde(rename = "Items", default)]
    items: Vec<String>,
}

impl ListStore for SharePointStore {
    fn list_info(&self, list_id: &str) -> StoreFuture<'_, ListInfo> {
        let path = Self::list_path(list_id);
        Box::pin(async move {
            self.get(self.request(Method::GET, &path).query(&[("$select", "Id,Title")])).await
        })
    }

    fn find_list(&self, title: &str) -> StoreFuture<'_, ListInfo> {
        let path = format!("lists/getByTitle({})", string_literal(title));
        Box::pin(async move {
            self.get(self.request(Method::GET, &path).query(&[("$select", "Id,Title")])).await
        })
    }

    fn site_lists(&self) -> StoreFuture<'_, Vec<SiteList>> {
        Box::pin(async move {
            self.get_collection(self.request(Method::GET, "lists").query(&[("$select", "Id,Title,Hidden")]))
                .await
        })
    }

    fn view(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, ViewInfo> {
        let path = Self::view_path(list_id, view_id);
        Box::pin(async move {
            self.get(
                self.request(Method::GET, &path)
                    .query(&[("$select", "ViewQuery,RowLimit,HtmlSchemaXml")]),
            )
            .await
        })
    }

    fn view_field_names(&self, list_id: &str, view_id: &str) -> StoreFuture<'_, Vec<String>> {
        let path = format!("{}/ViewFields", Self::view_path(list_id, view_id));
        Box::pin(async move {
            let resp: ViewFieldsResponse = self.get(self.request(Method::GET, &path)).await?;
            Ok(resp.items)
        })
    }

    fn field(&self, list_id: &str, name: &str) -> StoreFuture<'_, FieldSchema> {
        let path = format!(
            "{}/fields/getByInternalNameOrTitle({})",
            Self::list_path(list_id),
            string_literal(name)
        );
        Box::pin(async move {
            self.get(self.request(Method::GET, &path).query(&[("$select", FIELD_SELECT)])).await
        })
    }

    fn list_fields(&self, list_id: &str) -> StoreFuture<'_, Vec<FieldSchema>> {
        let path = format!("{}/fields", Self::list_path(list_id));
        Box::pin(async move {
            self.get_collection(self.request(Method::GET, &path).query(&[("$select", FIELD_SELECT)]))
                .await
        })
    }

    fn lookup_items(&self, list_id: &str, top: usize) -> StoreFuture<'_, Vec<LookupOption>> {
        let path = format!("{}/items", Self::list_path(list_id));
        Box::pin(async move {
            let items: Vec<IdTitle> = self
                .get_collection(
                    self.request(Method::GET, &path)
                        .query(&[("$select", "Id,Title".to_string()), ("$top", top.to_string())]),
                )
                .await?;
            Ok(items
                .into_iter()
                .map(|i| LookupOption { key: i.id, text: i.title.unwrap_or_default() })
                .collect())
        })
    }

    fn items(&self, list_id: &str, select: &[String], top: usize) -> StoreFuture<'_, Vec<Row>> {
        let path = format!("{}/items", Self::list_path(list_id));
        let select = select.join(",");
        Box::pin(async move {
            self.get_collection(
                self.request(Method::GET, &path)
                    .query(&[("$select", select), ("$top", top.to_string())]),
            )
            .await
        })
    }

    fn query_items(&self, list_id: &str, query: &CamlView) -> StoreFuture<'_, Vec<Row>> {
        let path = format!("{}/GetItems", Self::list_path(list_id));
        let body = json!({ "query": { "ViewXml": query.to_xml() } });
        Box::pin(async move {
            self.get_collection(self.request(Method::POST, &path).json(&body)).await
        })
    }

    fn item(&self, list_id: &str, id: i64, fields: &[ItemProjection]) -> StoreFuture<'_, Row> {
        let path = format!("{}/items({id})", Self::list_path(list_id));
        let (select, expand) = item_query(fields);
        Box::pin(async move {
            let mut req = self.request(Method::GET, &path).query(&[("$select", select)]);
            if !expand.is_empty() {
                req = req.query(&[("$expand", expand)]);
            }
            self.get(req).await
        })
    }

    fn add_item(&self, list_id: &str, payload: Row) -> StoreFuture<'_, i64> {
        let path = format!("{}/items", Self::list_path(list_id));
        Box::pin(async move {
            let created: IdTitle = self.get(self.request(Method::POST, &path).json(&payload)).await?;
            tracing::debug!(id = created.id, "SharePoint item created");
            Ok(created.id)
        })
    }

    fn update_item(&self, list_id: &str, id: i64, payload: Row) -> StoreFuture<'_, ()> {
        let path = format!("{}/items({id})", Self::list_path(list_id));
        Box::pin(async move {
            let req = self
                .request(Method::POST, &path)
                .header("X-HTTP-Method", "MERGE")
                .header("IF-MATCH", "*")
                .json(&payload);
            self.exec(req).await?;
            Ok(())
        })
    }

    fn recycle_item(&self, list_id: &str, id: i64) -> StoreFuture<'_, ()> {
        let path = format!("{}/items({id})/recycle()", Self::list_path(list_id));
        Box::pin(async move {
            self.exec(self.request(Method::POST, &path)).await?;
            Ok(())
        })
    }

    fn current_user_groups(&self) -> StoreFuture<'_, Vec<String>> {
        Box::pin(async move {
            let groups: Vec<GroupTitle> = self
                .get_collection(self.request(Method::GET, "currentuser/groups").query(&[("$select", "Title")]))
                .await?;
            Ok(groups.into_iter().map(|g| g.title).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_query_expands_references() {
        let (select, expand) = item_query(&[
            ItemProjection::plain("Placa"),
            ItemProjection::expanded("Proveedor"),
        ]);
        assert_eq!(select, "Id,Placa,Proveedor/Id,Proveedor/Title");
        assert_eq!(expand, "Proveedor");
    }

    #[test]
    fn rejects_non_http_site_url() {
        let cfg = SharePointConfig {
            site_url: "contoso.sharepoint.com".into(),
            access_token: None,
            accept_invalid_certs: false,
        };
        assert!(SharePointStore::new(&cfg).is_err());
    }

    #[test]
    fn paths_use_guid_literals() {
        assert_eq!(SharePointStore::list_path("{ABC}"), "lists(guid'ABC')");
        assert_eq!(SharePointStore::view_path("ABC", "DEF"), "lists(guid'ABC')/views(guid'DEF')");
    }
}
