use listgrid_api::{CamlQuery, CamlView, ListStore, Predicate, Row};

use crate::error::GridError;

/// Which kind of read a query serves; decides the fallback row limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadScope {
    /// Rows of the grid's own list.
    Base,
    /// Child rows matching a parent value.
    Related,
}

impl ReadScope {
    pub fn default_row_limit(&self) -> u32 {
        match self {
            ReadScope::Base => 100,
            ReadScope::Related => 200,
        }
    }
}

/// Inputs of one list query.
#[derive(Debug, Clone)]
pub struct QuerySpec<'a> {
    /// Body of the view's stored `<Query>`, if any.
    pub stored_query: Option<&'a str>,
    pub projection: &'a [String],
    /// The view's own row limit; absent or non-positive falls back to the scope default.
    pub row_limit: Option<i64>,
    pub scope: ReadScope,
    /// Extra condition conjoined with the stored filter.
    pub predicate: Option<Predicate>,
}

/// `ID` and `Title` first, then `fields` in order, without duplicates.
pub fn projection_fields<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
    let mut out = vec!["ID".to_string(), "Title".to_string()];
    for f in fields {
        let f = f.as_ref();
        if !f.is_empty() && !out.iter().any(|n| n == f) {
            out.push(f.to_string());
        }
    }
    out
}

pub fn effective_row_limit(row_limit: Option<i64>, scope: ReadScope) -> u32 {
    match row_limit {
        Some(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => scope.default_row_limit(),
    }
}

/// Build the query document: stored filter (AND injected predicate),
/// projection and row limit.
pub fn assemble(spec: &QuerySpec<'_>) -> Result<CamlView, GridError> {
    let mut query = CamlQuery::parse(spec.stored_query.unwrap_or(""))
        .map_err(|e| GridError::InvalidQuery(e.message().to_string()))?;
    if let Some(pred) = spec.predicate.clone() {
        query = query.and_where(pred);
    }
    Ok(CamlView {
        query,
        view_fields: projection_fields(spec.projection),
        row_limit: effective_row_limit(spec.row_limit, spec.scope),
    })
}

/// Assemble and execute; rows come back exactly as the store delivered them.
pub async fn run(
    store: &dyn ListStore,
    list_id: &str,
    spec: &QuerySpec<'_>,
) -> Result<Vec<Row>, GridError> {
    let view = assemble(spec)?;
    tracing::debug!(list = %list_id, caml = %view.to_xml(), "running list query");
    let rows = store
        .query_items(list_id, &view)
        .await
        .map_err(|e| GridError::Store(e.with_context(format!("list '{list_id}'"))))?;
    tracing::debug!(list = %list_id, rows = rows.len(), "list query done");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use listgrid_api::{CamlValue, FieldRef};

    fn spec<'a>(projection: &'a [String], row_limit: Option<i64>, scope: ReadScope) -> QuerySpec<'a> {
        QuerySpec { stored_query: None, projection, row_limit, scope, predicate: None }
    }

    #[test]
    fn id_and_title_appear_exactly_once() {
        let cases: [&[&str]; 4] = [
            &[],
            &["Placa"],
            &["Title", "ID", "Placa", "Title"],
            &["Placa", "Placa", "ID"],
        ];
        for fields in cases {
            let out = projection_fields(fields);
            assert_eq!(out.iter().filter(|n| *n == "ID").count(), 1, "{fields:?}");
            assert_eq!(out.iter().filter(|n| *n == "Title").count(), 1, "{fields:?}");
        }
        assert_eq!(projection_fields(&["Placa", "Title", "Placa"]), vec!["ID", "Title", "Placa"]);
    }

    #[test]
    fn row_limit_policy() {
        let p: Vec<String> = vec![];
        for limit in [None, Some(0), Some(-5)] {
            assert!(assemble(&spec(&p, limit, ReadScope::Base)).unwrap().to_xml().contains("<RowLimit>100</RowLimit>"));
            assert!(assemble(&spec(&p, limit, ReadScope::Related)).unwrap().to_xml().contains("<RowLimit>200</RowLimit>"));
        }
        assert!(assemble(&spec(&p, Some(50), ReadScope::Related)).unwrap().to_xml().contains("<RowLimit>50</RowLimit>"));
    }

    #[test]
    fn injected_predicate_joins_stored_filter() {
        let p = vec!["Placa".to_string()];
        let stored = "<Where><Eq><FieldRef Name='Activo'/><Value Type='Boolean'>1</Value></Eq></Where>\
                      <OrderBy><FieldRef Name='Placa'/></OrderBy>";
        let view = assemble(&QuerySpec {
            stored_query: Some(stored),
            projection: &p,
            row_limit: Some(30),
            scope: ReadScope::Related,
            predicate: Some(Predicate::eq(FieldRef::by_lookup_id("Vehiculo"), CamlValue::text("Lookup", "7"))),
        })
        .unwrap();
        assert_eq!(
            view.to_xml(),
            "<View><Query><Where><And>\
             <Eq><FieldRef Name='Activo'/><Value Type='Boolean'>1</Value></Eq>\
             <Eq><FieldRef Name='Vehiculo' LookupId='TRUE'/><Value Type='Lookup'>7</Value></Eq>\
             </And></Where><OrderBy><FieldRef Name='Placa'/></OrderBy></Query>\
             <ViewFields><FieldRef Name='ID'/><FieldRef Name='Title'/><FieldRef Name='Placa'/></ViewFields>\
             <RowLimit>30</RowLimit></View>"
        );
    }

    #[test]
    fn malformed_stored_query_is_reported() {
        let p: Vec<String> = vec![];
        let mut s = spec(&p, None, ReadScope::Base);
        s.stored_query = Some("<Where><Eq>");
        assert!(matches!(assemble(&s), Err(GridError::InvalidQuery(_))));
    }
}
