use listgrid_api::{CamlValue, FieldKind, FieldRef, Predicate};
use serde_json::Value;

use crate::error::GridError;
use crate::value::{is_truthy, iso_timestamp, number_text, parse_datetime, parse_number, scalar_text};

/// Equality comparison `field = value`, split into its two fragments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Equality {
    pub field_ref: FieldRef,
    pub value: CamlValue,
}

impl Equality {
    pub fn field_ref_xml(&self) -> String {
        self.field_ref.to_xml()
    }

    pub fn value_xml(&self) -> String {
        self.value.to_xml()
    }

    pub fn into_predicate(self) -> Predicate {
        Predicate::eq(self.field_ref, self.value)
    }
}

/// Build `field = value` with the value encoded for the field's type.
///
/// | kind          | reference                         | value                                   |
/// |---------------|-----------------------------------|-----------------------------------------|
/// | Lookup, User  | `LookupId='TRUE'` for numeric ids | `Lookup`                                |
/// | Number, Currency | plain                          | `Number`                                |
/// | DateTime      | plain                             | `DateTime`, ISO-8601 with time          |
/// | Boolean       | plain                             | `Boolean`, `1` / `0`                    |
/// | anything else | plain                             | `Text`                                  |
pub fn build_equality(field: &str, kind: &FieldKind, value: &Value) -> Result<Equality, GridError> {
    let eq = match kind {
        FieldKind::Lookup | FieldKind::User => match lookup_id(value) {
            Some(id) => Equality {
                field_ref: FieldRef::by_lookup_id(field),
                value: CamlValue::text("Lookup", id),
            },
            None => Equality {
                field_ref: FieldRef::new(field),
                value: CamlValue::text("Lookup", required_text(field, value)?),
            },
        },
        FieldKind::Number | FieldKind::Currency => {
            let n = parse_number(value)
                .ok_or_else(|| GridError::invalid_value(field, format!("{value} is not a number")))?;
            Equality {
                field_ref: FieldRef::new(field),
                value: CamlValue::text("Number", number_text(n)),
            }
        }
        FieldKind::DateTime => {
            let dt = parse_datetime(value)
                .ok_or_else(|| GridError::invalid_value(field, format!("{value} is not a date")))?;
            Equality {
                field_ref: FieldRef::new(field),
                value: CamlValue::text("DateTime", iso_timestamp(&dt)).with_time(),
            }
        }
        FieldKind::Boolean => Equality {
            field_ref: FieldRef::new(field),
            value: CamlValue::text("Boolean", if is_truthy(value) { "1" } else { "0" }),
        },
        _ => Equality {
            field_ref: FieldRef::new(field),
            value: CamlValue::text("Text", required_text(field, value)?),
        },
    };
    Ok(eq)
}

/// A lookup is compared by id when the value is any JSON number, or a raw
/// `{Id, Title}` cell with a numeric id. The number is written as given.
fn lookup_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => match map.get("Id").or_else(|| map.get("ID")) {
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
        _ => None,
    }
}

fn required_text(field: &str, value: &Value) -> Result<String, GridError> {
    scalar_text(value)
        .ok_or_else(|| GridError::invalid_value(field, "expected a scalar value"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn build(kind: &str, value: Value) -> Equality {
        build_equality("Campo", &FieldKind::parse(kind), &value).unwrap()
    }

    #[test]
    fn value_type_follows_dispatch_table() {
        let cases = [
            ("Lookup", json!(10), "Lookup"),
            ("user", json!("Ana"), "Lookup"),
            ("Number", json!("12.5"), "Number"),
            ("CURRENCY", json!(3), "Number"),
            ("DateTime", json!("2024-03-01"), "DateTime"),
            ("Boolean", json!(true), "Boolean"),
            ("Choice", json!("Activo"), "Text"),
            ("Text", json!("x"), "Text"),
        ];
        for (kind, value, expected) in cases {
            let eq = build(kind, value);
            assert!(
                eq.value_xml().contains(&format!("Type='{expected}'")),
                "{kind}: {}",
                eq.value_xml()
            );
        }
    }

    #[test]
    fn lookup_id_flag_only_for_numeric_lookups() {
        let eq = build("Lookup", json!(10));
        assert!(eq.field_ref_xml().contains("LookupId='TRUE'"));
        assert_eq!(eq.value_xml(), "<Value Type='Lookup'>10</Value>");

        assert!(!build("Lookup", json!("Acme")).field_ref_xml().contains("LookupId"));
        assert!(!build("Lookup", json!("10")).field_ref_xml().contains("LookupId"));
        assert!(!build("Number", json!(10)).field_ref_xml().contains("LookupId"));
        assert!(!build("Text", json!(10)).field_ref_xml().contains("LookupId"));
    }

    #[test]
    fn any_number_compares_user_and_lookup_by_id() {
        let eq = build("User", json!(7));
        assert_eq!(eq.field_ref_xml(), "<FieldRef Name='Campo' LookupId='TRUE'/>");
        assert_eq!(eq.value_xml(), "<Value Type='Lookup'>7</Value>");

        let eq = build("Lookup", json!(2.5));
        assert!(eq.field_ref_xml().contains("LookupId='TRUE'"));
        assert_eq!(eq.value_xml(), "<Value Type='Lookup'>2.5</Value>");

        let eq = build("Lookup", json!({ "Id": 4, "Title": "Acme" }));
        assert!(eq.field_ref_xml().contains("LookupId='TRUE'"));
        assert_eq!(eq.value_xml(), "<Value Type='Lookup'>4</Value>");
    }

    #[test]
    fn datetime_carries_time_component() {
        let eq = build("DateTime", json!("2024-03-01T08:15:00Z"));
        assert_eq!(
            eq.value_xml(),
            "<Value IncludeTimeValue='TRUE' Type='DateTime'>2024-03-01T08:15:00.000Z</Value>"
        );
    }

    #[test]
    fn booleans_encode_as_digits() {
        assert!(build("Boolean", json!("TRUE")).value_xml().contains(">1<"));
        assert!(build("Boolean", json!(0)).value_xml().contains(">0<"));
    }

    #[test]
    fn text_and_field_names_are_escaped() {
        let eq = build_equality("a'b", &FieldKind::Text, &json!(r#"<&>"'"#)).unwrap();
        let xml = format!("{}{}", eq.field_ref_xml(), eq.value_xml());
        assert!(xml.contains("a&apos;b"));
        assert!(xml.contains("&lt;&amp;&gt;&quot;&apos;"));
        let inner = xml
            .replace("&amp;", "")
            .replace("&lt;", "")
            .replace("&gt;", "")
            .replace("&quot;", "")
            .replace("&apos;", "");
        // What remains is only the element skeleton.
        assert_eq!(inner, "<FieldRef Name='ab'/><Value Type='Text'></Value>");
    }

    #[test]
    fn non_numeric_number_is_rejected() {
        let err = build_equality("Km", &FieldKind::Number, &json!("mucho")).unwrap_err();
        assert!(matches!(err, GridError::InvalidValue { .. }));
    }
}
