use std::sync::Arc;

use listgrid_api::{ErrorKind, FieldKind, Row};
use listgrid_engine::lookup;
use listgrid_engine::{EditValue, ListGrid, LookupPick, RelatedQuery, StatusConfig, StatusPolicy};
use serde_json::{Value, json};
use storage_memory::{MemoryList, MemoryListStore, MemoryView};

fn row(v: Value) -> Row {
    serde_json::from_value(v).unwrap()
}

fn fleet() -> MemoryListStore {
    MemoryListStore::new()
        .with_user_groups(["Visitantes", "EDITORES"])
        .with_list(
            MemoryList::new("L2", "Proveedores")
                .item(row(json!({ "ID": 10, "Title": "Acme" })))
                .item(row(json!({ "ID": 20, "Title": "Zenith" }))),
        )
        .with_list(
            MemoryList::new("L1", "Vehiculos")
                .text("Placa")
                .typed("Activo", "Boolean")
                .typed("Km", "Number")
                .lookup("Proveedor", "L2", true)
                .lookup("Taller", "L2", false)
                .view("v1", MemoryView::new(["LinkTitle", "Placa", "Proveedor", "Modified"]))
                .view("v2", MemoryView::new(["Placa", "Proveedor", "Taller"]).row_limit(0))
                .view(
                    "activos",
                    MemoryView::new(["Placa"])
                        .query("<Where><Eq><FieldRef Name='Activo'/><Value Type='Boolean'>1</Value></Eq></Where>")
                        .row_limit(50),
                )
                .item(row(json!({ "ID": 1, "Title": "V-1", "Placa": "AB123", "Activo": true, "ProveedorId": [10, 20] })))
                .item(row(json!({ "ID": 2, "Title": "V-2", "Placa": "CD456", "Activo": false, "TallerId": 20 }))),
        )
        .with_list(
            MemoryList::new("M", "Mantenciones")
                .lookup("Vehiculo", "L1", false)
                .typed("Costo", "Currency")
                .view(
                    "pv",
                    MemoryView::new(["LinkTitle", "Vehiculo", "Costo"])
                        .query("<Where><Gt><FieldRef Name='Costo'/><Value Type='Number'>100</Value></Gt></Where>"),
                )
                .item(row(json!({ "Title": "Aceite", "VehiculoId": 1, "Costo": 80 })))
                .item(row(json!({ "Title": "Frenos", "VehiculoId": 1, "Costo": 150 })))
                .item(row(json!({ "Title": "Neumaticos", "VehiculoId": 2, "Costo": 300 }))),
        )
        .with_list(
            MemoryList::new("R", "TipoFormulario")
                .hidden()
                .text("campo")
                .typed("amarillo", "Number")
                .item(row(json!({ "Title": "SOAP", "campo": "Vence", "amarillo": 10 }))),
        )
}

fn setup() -> (Arc<MemoryListStore>, ListGrid) {
    let store = Arc::new(fleet());
    let grid = ListGrid::new(store.clone(), "L1");
    (store, grid)
}

#[tokio::test]
async fn view_grid_resolves_multi_value_lookups() {
    let (_, grid) = setup();
    let loaded = grid.view_grid("v1", None).await.unwrap();

    let keys: Vec<&str> = loaded.columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["Title", "Placa", "Proveedor"]);

    let first = &loaded.rows[0];
    assert_eq!(first["ID"], json!(1));
    assert_eq!(first["Placa"], json!("AB123"));
    assert_eq!(first["Proveedor"], json!(["Acme", "Zenith"]));
    assert_eq!(loaded.list_id, "L1");
}

#[tokio::test]
async fn multi_value_field_is_always_an_array() {
    let (_, grid) = setup();
    let loaded = grid.view_grid("v1", None).await.unwrap();
    assert_eq!(loaded.rows[1]["Proveedor"], json!([]));
}

#[tokio::test]
async fn shared_lookup_list_is_read_once_per_load() {
    let (store, grid) = setup();
    let loaded = grid.view_grid("v2", None).await.unwrap();
    assert_eq!(store.lookup_fetches("L2").await, 1);
    assert_eq!(loaded.rows[1]["Taller"], json!("Zenith"));
    assert!(loaded.rows[0].get("Taller").is_none());

    grid.view_grid("v2", None).await.unwrap();
    assert_eq!(store.lookup_fetches("L2").await, 2);
}

#[tokio::test]
async fn lookup_resolution_is_idempotent() {
    let (store, grid) = setup();
    let loaded = grid.view_grid("v2", None).await.unwrap();
    let again = lookup::resolve(store.as_ref(), loaded.rows.clone(), &loaded.fields).await.unwrap();
    assert_eq!(again, loaded.rows);
}

#[tokio::test]
async fn schema_markup_is_used_when_field_list_is_unavailable() {
    let store = Arc::new(fleet().without_structured_view_fields());
    let grid = ListGrid::new(store, "L1");
    let names = grid.view_field_names("v1").await.unwrap();
    assert_eq!(names, vec!["Title", "Placa", "Proveedor"]);
}

#[tokio::test]
async fn unknown_view_is_not_found() {
    let (_, grid) = setup();
    let err = grid.view_grid("nope", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn one_failing_field_fails_the_whole_grid() {
    let store = Arc::new(fleet().with_failing_field("L1", "Placa"));
    let grid = ListGrid::new(store, "L1");
    let err = grid.view_grid("v1", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(err.to_string().contains("field 'Placa'"));
}

#[tokio::test]
async fn stored_filter_and_row_limits_reach_the_store() {
    let (store, grid) = setup();
    let loaded = grid.view_grid("activos", Some("Activo")).await.unwrap();
    assert_eq!(loaded.rows.len(), 1);
    assert_eq!(loaded.rows[0]["Activo"], json!(true));
    grid.view_grid("v2", None).await.unwrap();

    let queries = store.executed_queries().await;
    assert!(queries[0].contains("<FieldRef Name='Activo'/></ViewFields>"));
    assert!(queries[0].contains("<RowLimit>50</RowLimit>"));
    assert!(queries[1].contains("<RowLimit>100</RowLimit>"));
}

#[tokio::test]
async fn related_grid_conjoins_view_filter_with_parent_value() {
    let (store, grid) = setup();
    let parent = json!(1);
    let related = RelatedQuery { child_list_id: "M", child_field: "Vehiculo", parent_value: &parent };
    let loaded = grid.related_grid_by_view(&related, "pv").await.unwrap();

    assert_eq!(loaded.rows.len(), 1);
    assert_eq!(loaded.rows[0]["Title"], json!("Frenos"));
    assert_eq!(loaded.rows[0]["Vehiculo"], json!("V-1"));
    let keys: Vec<&str> = loaded.columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["ID", "Title", "Vehiculo", "Costo"]);

    let caml = store.executed_queries().await.pop().unwrap();
    assert!(caml.contains(
        "<Where><And><Gt><FieldRef Name='Costo'/><Value Type='Number'>100</Value></Gt>\
         <Eq><FieldRef Name='Vehiculo' LookupId='TRUE'/><Value Type='Lookup'>1</Value></Eq></And></Where>"
    ));
    assert!(caml.contains("<RowLimit>200</RowLimit>"));
}

#[tokio::test]
async fn related_items_infer_columns() {
    let (store, grid) = setup();
    let parent = json!(2);
    let related = RelatedQuery { child_list_id: "M", child_field: "Vehiculo", parent_value: &parent };
    let loaded = grid.related_items(&related).await.unwrap();

    assert_eq!(loaded.rows.len(), 1);
    assert!(loaded.fields.is_empty());
    let keys: Vec<&str> = loaded.columns.iter().map(|c| c.key.as_str()).collect();
    assert!(keys.contains(&"Title"));
    assert!(!keys.contains(&"ID") && !keys.contains(&"Id"));

    let caml = store.executed_queries().await.pop().unwrap();
    assert!(!caml.contains("<ViewFields>"));
    assert!(caml.ends_with("<RowLimit>200</RowLimit></View>"));
}

#[tokio::test]
async fn edit_round_trip_writes_id_payloads() {
    let (store, grid) = setup();
    let names = vec!["Placa".to_string(), "Proveedor".to_string(), "Km".to_string()];
    let schema = grid.fields_meta(&names).await.unwrap();

    let mut draft = grid.item_values(1, &schema).await.unwrap();
    assert_eq!(
        draft["Proveedor"],
        EditValue::Lookups(vec![
            LookupPick { key: 10, text: "Acme".into() },
            LookupPick { key: 20, text: "Zenith".into() },
        ])
    );

    draft.insert("Proveedor".into(), EditValue::Lookups(vec![LookupPick { key: 20, text: "Zenith".into() }]));
    draft.insert("Km".into(), EditValue::Text("1500".into()));
    grid.update_fields(1, &schema, &draft).await.unwrap();

    let stored = store.stored_item("L1", 1).await.unwrap();
    assert_eq!(stored["ProveedorId"], json!([20]));
    assert_eq!(stored["Km"], json!(1500));
    assert!(stored.get("Proveedor").is_none());
}

#[tokio::test]
async fn invalid_number_is_rejected_before_writing() {
    let (store, grid) = setup();
    let schema = grid.fields_meta(&["Km".to_string()]).await.unwrap();
    let mut draft = listgrid_engine::EditDraft::new();
    draft.insert("Km".into(), EditValue::Text("mucho".into()));
    let err = grid.update_fields(2, &schema, &draft).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(store.stored_item("L1", 2).await.unwrap().get("Km").is_none());
}

#[tokio::test]
async fn add_toggle_and_recycle() {
    let (store, grid) = setup();
    let schema = grid.fields_meta(&["Placa".to_string(), "Activo".to_string()]).await.unwrap();
    let mut draft = listgrid_engine::EditDraft::new();
    draft.insert("Placa".into(), EditValue::Text("EF789".into()));
    draft.insert("Activo".into(), EditValue::Text("1".into()));
    let id = grid.add_item(&schema, &draft).await.unwrap();
    assert_eq!(store.stored_item("L1", id).await.unwrap()["Activo"], json!(true));

    assert!(!grid.toggle(id, "Activo").await.unwrap());
    assert!(grid.toggle(id, "Activo").await.unwrap());

    grid.recycle(id).await.unwrap();
    assert!(store.stored_item("L1", id).await.is_none());
}

#[tokio::test]
async fn edit_schema_offers_lookup_options() {
    let (_, grid) = setup();
    let schema = grid
        .edit_schema(&["Proveedor".to_string(), "Activo".to_string()])
        .await
        .unwrap();
    assert_eq!(schema[0].descriptor.kind, FieldKind::Lookup);
    let json = serde_json::to_value(&schema).unwrap();
    assert_eq!(json[0]["control"], json!("lookupSelect"));
    assert_eq!(json[0]["multiple"], json!(true));
    assert_eq!(json[0]["options"], json!([{ "key": 10, "text": "Acme" }, { "key": 20, "text": "Zenith" }]));
    assert_eq!(json[1]["control"], json!("toggle"));
}

#[tokio::test]
async fn group_membership_ignores_case() {
    let (_, grid) = setup();
    assert!(grid.user_in_group("Editores").await.unwrap());
    assert!(!grid.user_in_group("Administradores").await.unwrap());
}

#[tokio::test]
async fn site_lists_and_fields_hide_internal_entries() {
    let (_, grid) = setup();
    let lists = grid.site_lists().await.unwrap();
    assert!(lists.iter().all(|l| l.id != "R"));
    assert_eq!(lists.len(), 3);

    let fields = grid.list_fields("L1").await.unwrap();
    assert!(fields.iter().any(|f| f.internal_name == "Proveedor"));
}

#[tokio::test]
async fn status_rules_load_from_rule_list() {
    let (_, grid) = setup();
    let config = StatusConfig {
        enabled: true,
        type_field: Some("Tipo".into()),
        rules_list: Some("tipoformulario".into()),
        ..StatusConfig::default()
    };
    let policy = StatusPolicy::load(grid.store(), &config).await.unwrap();
    assert_eq!(policy.rules.get("soap").map(|r| r.warn_days), Some(10));
}
