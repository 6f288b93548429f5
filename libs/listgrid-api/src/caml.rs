//! CAML query documents: a minimal structural model, parsed from a view's
//! stored query body and serialized once when the query is sent.
//!
//! Only the parts the grid needs are modelled (`Where` with binary
//! `And`/`Or` and comparison leaves, `OrderBy`). Anything else is carried
//! verbatim so a round trip never drops a clause the view author wrote.

use std::fmt::Write as _;

use roxmltree::{Document, Node};

use crate::error::StoreError;

/// Escape `& < > " '` for use in CAML text or attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

// ════════════════════════════════════════════════════════════════
//  Leaves
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Geq,
    Lt,
    Leq,
    IsNull,
    IsNotNull,
    Contains,
    BeginsWith,
}

impl CompareOp {
    pub fn tag(&self) -> &'static str {
        match self {
            CompareOp::Eq => "Eq",
            CompareOp::Neq => "Neq",
            CompareOp::Gt => "Gt",
            CompareOp::Geq => "Geq",
            CompareOp::Lt => "Lt",
            CompareOp::Leq => "Leq",
            CompareOp::IsNull => "IsNull",
            CompareOp::IsNotNull => "IsNotNull",
            CompareOp::Contains => "Contains",
            CompareOp::BeginsWith => "BeginsWith",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "Eq" => CompareOp::Eq,
            "Neq" => CompareOp::Neq,
            "Gt" => CompareOp::Gt,
            "Geq" => CompareOp::Geq,
            "Lt" => CompareOp::Lt,
            "Leq" => CompareOp::Leq,
            "IsNull" => CompareOp::IsNull,
            "IsNotNull" => CompareOp::IsNotNull,
            "Contains" => CompareOp::Contains,
            "BeginsWith" => CompareOp::BeginsWith,
            _ => return None,
        })
    }

    /// `IsNull` / `IsNotNull` take no `<Value>`.
    pub fn is_unary(&self) -> bool {
        matches!(self, CompareOp::IsNull | CompareOp::IsNotNull)
    }
}

/// Attributes not modelled by a node (`StorageTZ`, `Nullable`, ...), in
/// document order.
pub type Attributes = Vec<(String, String)>;

fn write_attributes(out: &mut String, attributes: &Attributes) {
    for (k, v) in attributes {
        let _ = write!(out, " {k}='{}'", escape_xml(v));
    }
}

/// `<FieldRef Name='...'/>`, optionally comparing a lookup by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub lookup_id: bool,
    pub attributes: Attributes,
}

impl FieldRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), lookup_id: false, attributes: Vec::new() }
    }

    pub fn by_lookup_id(name: impl Into<String>) -> Self {
        Self { name: name.into(), lookup_id: true, attributes: Vec::new() }
    }

    pub fn to_xml(&self) -> String {
        let mut out = format!("<FieldRef Name='{}'", escape_xml(&self.name));
        if self.lookup_id {
            out.push_str(" LookupId='TRUE'");
        }
        write_attributes(&mut out, &self.attributes);
        out.push_str("/>");
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueContent {
    /// Literal text, escaped on output.
    Text(String),
    /// Child markup such as `<Today/>`, emitted as-is.
    Markup(String),
}

/// `<Value Type='...'>...</Value>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CamlValue {
    pub value_type: String,
    pub include_time: bool,
    pub attributes: Attributes,
    pub content: ValueContent,
}

impl CamlValue {
    pub fn text(value_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            value_type: value_type.into(),
            include_time: false,
            attributes: Vec::new(),
            content: ValueContent::Text(text.into()),
        }
    }

    pub fn with_time(mut self) -> Self {
        self.include_time = true;
        self
    }

    /// Literal text of the value, `None` for markup content.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            ValueContent::Text(s) => Some(s),
            ValueContent::Markup(_) => None,
        }
    }

    pub fn to_xml(&self) -> String {
        let body = match &self.content {
            ValueContent::Text(s) => escape_xml(s),
            ValueContent::Markup(m) => m.clone(),
        };
        let mut out = String::from("<Value");
        if self.include_time {
            out.push_str(" IncludeTimeValue='TRUE'");
        }
        let _ = write!(out, " Type='{}'", escape_xml(&self.value_type));
        write_attributes(&mut out, &self.attributes);
        let _ = write!(out, ">{body}</Value>");
        out
    }
}

// ════════════════════════════════════════════════════════════════
//  Predicate
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Compare {
        op: CompareOp,
        field: FieldRef,
        value: Option<CamlValue>,
    },
    /// Operator not modelled here (`In`, `Membership`, ...), kept verbatim.
    Raw(String),
}

impl Predicate {
    pub fn eq(field: FieldRef, value: CamlValue) -> Self {
        Predicate::Compare { op: CompareOp::Eq, field, value: Some(value) }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                let tag = if matches!(self, Predicate::And(..)) { "And" } else { "Or" };
                let _ = write!(out, "<{tag}>");
                l.write_xml(out);
                r.write_xml(out);
                let _ = write!(out, "</{tag}>");
            }
            Predicate::Compare { op, field, value } => {
                let tag = op.tag();
                let _ = write!(out, "<{tag}>{}", field.to_xml());
                if let Some(v) = value {
                    out.push_str(&v.to_xml());
                }
                let _ = write!(out, "</{tag}>");
            }
            Predicate::Raw(markup) => out.push_str(markup),
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Query
// ════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderField {
    pub name: String,
    pub ascending: bool,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBy {
    /// Attributes of the `<OrderBy>` element itself (`Override`, ...).
    pub attributes: Vec<(String, String)>,
    pub fields: Vec<OrderField>,
}

/// Body of a `<Query>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CamlQuery {
    pub filter: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    /// Other top-level elements (`GroupBy`, ...), verbatim and in order.
    pub extra: Vec<String>,
}

impl CamlQuery {
    /// Parse a stored query body such as `<Where>...</Where><OrderBy>...</OrderBy>`.
    ///
    /// Accepts an empty body, a self-closing `<Where/>` and a body still
    /// wrapped in `<Query>`. Malformed markup is an `InvalidQuery` error.
    pub fn parse(body: &str) -> Result<Self, StoreError> {
        let body = body.trim();
        if body.is_empty() {
            return Ok(Self::default());
        }
        let wrapped = format!("<Query>{body}</Query>");
        let doc = Document::parse(&wrapped)?;
        let mut root = doc.root_element();
        let children: Vec<Node> = root.children().filter(|n| n.is_element()).collect();
        if children.len() == 1 && children[0].has_tag_name("Query") {
            root = children[0];
        }

        let mut query = Self::default();
        for node in root.children() {
            if node.is_text() {
                if node.text().is_some_and(|t| !t.trim().is_empty()) {
                    return Err(StoreError::invalid_query("stray text in query body"));
                }
                continue;
            }
            if !node.is_element() {
                continue;
            }
            match node.tag_name().name() {
                "Where" => {
                    if query.filter.is_some() {
                        return Err(StoreError::invalid_query("duplicate <Where>"));
                    }
                    query.filter = parse_where(node, &wrapped)?;
                }
                "OrderBy" => query.order_by = Some(parse_order_by(node)),
                _ => query.extra.push(wrapped[node.range()].to_string()),
            }
        }
        Ok(query)
    }

    /// Conjoin `pred` with the existing filter: `And(existing, pred)`, or
    /// just `pred` when there is none.
    pub fn and_where(mut self, pred: Predicate) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(pred),
            None => pred,
        });
        self
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        if let Some(filter) = &self.filter {
            out.push_str("<Where>");
            filter.write_xml(&mut out);
            out.push_str("</Where>");
        }
        if let Some(order) = &self.order_by {
            out.push_str("<OrderBy");
            write_attributes(&mut out, &order.attributes);
            out.push('>');
            for f in &order.fields {
                let _ = write!(out, "<FieldRef Name='{}'", escape_xml(&f.name));
                if !f.ascending {
                    out.push_str(" Ascending='FALSE'");
                }
                write_attributes(&mut out, &f.attributes);
                out.push_str("/>");
            }
            out.push_str("</OrderBy>");
        }
        for extra in &self.extra {
            out.push_str(extra);
        }
        out
    }
}

fn parse_where(node: Node, src: &str) -> Result<Option<Predicate>, StoreError> {
    let children: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
    match children.as_slice() {
        [] => Ok(None),
        [only] => parse_predicate(*only, src).map(Some),
        _ => Err(StoreError::invalid_query("<Where> must have exactly one child")),
    }
}

fn parse_predicate(node: Node, src: &str) -> Result<Predicate, StoreError> {
    let tag = node.tag_name().name();
    if tag == "And" || tag == "Or" {
        let mut parts = node
            .children()
            .filter(|n| n.is_element())
            .map(|n| parse_predicate(n, src));
        let first = parts
            .next()
            .ok_or_else(|| StoreError::invalid_query(format!("empty <{tag}>")))??;
        // Folded left so a non-binary combinator still yields a valid tree.
        return parts.try_fold(first, |acc, next| {
            let next = next?;
            Ok(if tag == "And" { acc.and(next) } else { acc.or(next) })
        });
    }

    let Some(op) = CompareOp::from_tag(tag) else {
        return Ok(Predicate::Raw(src[node.range()].to_string()));
    };

    let field_node = node
        .children()
        .find(|n| n.has_tag_name("FieldRef"))
        .ok_or_else(|| StoreError::invalid_query(format!("<{tag}> without <FieldRef>")))?;
    let name = field_node
        .attribute("Name")
        .ok_or_else(|| StoreError::invalid_query("<FieldRef> without Name"))?;
    let field = FieldRef {
        name: name.to_string(),
        lookup_id: field_node
            .attribute("LookupId")
            .is_some_and(|v| v.eq_ignore_ascii_case("TRUE")),
        attributes: unmodelled(field_node, &["Name", "LookupId"]),
    };

    let value = match node.children().find(|n| n.has_tag_name("Value")) {
        Some(v) => Some(parse_value(v, src)),
        None if op.is_unary() => None,
        None => return Err(StoreError::invalid_query(format!("<{tag}> without <Value>"))),
    };
    Ok(Predicate::Compare { op, field, value })
}

fn parse_value(node: Node, src: &str) -> CamlValue {
    let elements: Vec<Node> = node.children().filter(|n| n.is_element()).collect();
    let content = match (elements.first(), elements.last()) {
        (Some(first), Some(last)) => {
            ValueContent::Markup(src[first.range().start..last.range().end].to_string())
        }
        _ => ValueContent::Text(
            node.children()
                .filter(|n| n.is_text())
                .filter_map(|n| n.text())
                .collect(),
        ),
    };
    CamlValue {
        value_type: node.attribute("Type").unwrap_or("Text").to_string(),
        include_time: node
            .attribute("IncludeTimeValue")
            .is_some_and(|v| v.eq_ignore_ascii_case("TRUE")),
        attributes: unmodelled(node, &["Type", "IncludeTimeValue"]),
        content,
    }
}

fn unmodelled(node: Node, known: &[&str]) -> Attributes {
    node.attributes()
        .filter(|a| !known.contains(&a.name()))
        .map(|a| (a.name().to_string(), a.value().to_string()))
        .collect()
}

fn parse_order_by(node: Node) -> OrderBy {
    OrderBy {
        attributes: unmodelled(node, &[]),
        fields: node
            .children()
            .filter(|n| n.has_tag_name("FieldRef"))
            .filter_map(|n| {
                Some(OrderField {
                    name: n.attribute("Name")?.to_string(),
                    ascending: !n
                        .attribute("Ascending")
                        .is_some_and(|v| v.eq_ignore_ascii_case("FALSE")),
                    attributes: unmodelled(n, &["Name", "Ascending"]),
                })
            })
            .collect(),
    }
}

// ════════════════════════════════════════════════════════════════
//  View document
// ════════════════════════════════════════════════════════════════

/// Complete query document sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CamlView {
    pub query: CamlQuery,
    /// Projection; empty means "store default".
    pub view_fields: Vec<String>,
    pub row_limit: u32,
}

impl CamlView {
    pub fn to_xml(&self) -> String {
        let mut out = String::from("<View><Query>");
        out.push_str(&self.query.to_xml());
        out.push_str("</Query>");
        if !self.view_fields.is_empty() {
            out.push_str("<ViewFields>");
            for name in &self.view_fields {
                out.push_str(&FieldRef::new(name.as_str()).to_xml());
            }
            out.push_str("</ViewFields>");
        }
        let _ = write!(out, "<RowLimit>{}</RowLimit></View>", self.row_limit);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq_text(field: &str, text: &str) -> Predicate {
        Predicate::eq(FieldRef::new(field), CamlValue::text("Text", text))
    }

    #[test]
    fn escapes_all_five_characters() {
        assert_eq!(escape_xml(r#"a&b<c>d"e'f"#), "a&amp;b&lt;c&gt;d&quot;e&apos;f");
    }

    #[test]
    fn empty_and_self_closing_where_have_no_filter() {
        assert_eq!(CamlQuery::parse("").unwrap(), CamlQuery::default());
        assert_eq!(CamlQuery::parse("   ").unwrap(), CamlQuery::default());
        assert_eq!(CamlQuery::parse("<Where/>").unwrap().filter, None);
    }

    #[test]
    fn parses_where_and_order_by() {
        let q = CamlQuery::parse(
            "<OrderBy><FieldRef Name='Modified' Ascending='FALSE'/></OrderBy>\
             <Where><Eq><FieldRef Name='Estado'/><Value Type='Text'>Activo</Value></Eq></Where>",
        )
        .unwrap();
        assert_eq!(q.filter, Some(eq_text("Estado", "Activo")));
        let order = q.order_by.unwrap();
        assert_eq!(
            order.fields,
            vec![OrderField { name: "Modified".into(), ascending: false, attributes: Vec::new() }]
        );
    }

    #[test]
    fn unwraps_query_element() {
        let q = CamlQuery::parse("<Query><Where><IsNull><FieldRef Name='Baja'/></IsNull></Where></Query>")
            .unwrap();
        assert!(matches!(
            q.filter,
            Some(Predicate::Compare { op: CompareOp::IsNull, value: None, .. })
        ));
    }

    #[test]
    fn and_where_wraps_existing_or_at_top_level() {
        let q = CamlQuery::parse(
            "<Where><Or><Eq><FieldRef Name='A'/><Value Type='Text'>1</Value></Eq>\
             <Eq><FieldRef Name='B'/><Value Type='Text'>2</Value></Eq></Or></Where>",
        )
        .unwrap()
        .and_where(eq_text("C", "3"));
        assert_eq!(
            q.to_xml(),
            "<Where><And><Or>\
             <Eq><FieldRef Name='A'/><Value Type='Text'>1</Value></Eq>\
             <Eq><FieldRef Name='B'/><Value Type='Text'>2</Value></Eq>\
             </Or><Eq><FieldRef Name='C'/><Value Type='Text'>3</Value></Eq></And></Where>"
        );
    }

    #[test]
    fn and_where_on_empty_query_becomes_whole_filter() {
        let q = CamlQuery::parse("<OrderBy><FieldRef Name='Title'/></OrderBy>")
            .unwrap()
            .and_where(eq_text("C", "3"));
        assert_eq!(
            q.to_xml(),
            "<Where><Eq><FieldRef Name='C'/><Value Type='Text'>3</Value></Eq></Where>\
             <OrderBy><FieldRef Name='Title'/></OrderBy>"
        );
    }

    #[test]
    fn unknown_operators_and_markup_values_survive() {
        let body = "<Where><And><In><FieldRef Name='Tipo'/><Values><Value Type='Text'>A</Value></Values></In>\
                    <Leq><FieldRef Name='Vence'/><Value Type='DateTime'><Today/></Value></Leq></And></Where>\
                    <GroupBy Collapse='TRUE'><FieldRef Name='Tipo'/></GroupBy>";
        let q = CamlQuery::parse(body).unwrap();
        let xml = q.to_xml();
        assert!(xml.contains("<In><FieldRef Name='Tipo'/><Values><Value Type='Text'>A</Value></Values></In>"));
        assert!(xml.contains("<Value Type='DateTime'><Today/></Value>"));
        assert!(xml.ends_with("<GroupBy Collapse='TRUE'><FieldRef Name='Tipo'/></GroupBy>"));
    }

    #[test]
    fn unmodelled_attributes_survive_and_where() {
        let body = "<Where><Leq><FieldRef Name='Vence' Type='DateTime' Nullable='TRUE'/>\
                    <Value Type='DateTime' IncludeTimeValue='TRUE' StorageTZ='TRUE'>2024-03-01T00:00:00Z</Value>\
                    </Leq></Where><OrderBy Override='TRUE'><FieldRef Name='Placa' Explicit='TRUE'/></OrderBy>";
        let xml = CamlQuery::parse(body).unwrap().and_where(eq_text("C", "3")).to_xml();
        assert_eq!(
            xml,
            "<Where><And><Leq><FieldRef Name='Vence' Type='DateTime' Nullable='TRUE'/>\
             <Value IncludeTimeValue='TRUE' Type='DateTime' StorageTZ='TRUE'>2024-03-01T00:00:00Z</Value></Leq>\
             <Eq><FieldRef Name='C'/><Value Type='Text'>3</Value></Eq></And></Where>\
             <OrderBy Override='TRUE'><FieldRef Name='Placa' Explicit='TRUE'/></OrderBy>"
        );
    }

    #[test]
    fn malformed_body_is_invalid_query() {
        let err = CamlQuery::parse("<Where><Eq>").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidQuery);
        let err = CamlQuery::parse("<Where><Eq><Value Type='Text'>x</Value></Eq></Where>").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidQuery);
    }

    #[test]
    fn view_document_layout() {
        let view = CamlView {
            query: CamlQuery::default(),
            view_fields: vec!["ID".into(), "Title".into()],
            row_limit: 100,
        };
        assert_eq!(
            view.to_xml(),
            "<View><Query></Query><ViewFields><FieldRef Name='ID'/><FieldRef Name='Title'/></ViewFields>\
             <RowLimit>100</RowLimit></View>"
        );
    }

    #[test]
    fn text_values_are_escaped_and_unescaped_on_parse() {
        let p = eq_text("Nota", "a<b & 'c'");
        let xml = format!("<Where>{}</Where>", p.to_xml());
        assert!(xml.contains("a&lt;b &amp; &apos;c&apos;"));
        assert_eq!(CamlQuery::parse(&xml).unwrap().filter, Some(p));
    }
}
