use serde_json::{Map, Value};

/// Structural class of a JSON value, decided once at ingestion.
///
/// Downstream code matches on the variant instead of re-inspecting the
/// value's type at every use site.
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    Scalar(&'a Value),
    Mapping(&'a Map<String, Value>),
    Sequence(&'a [Value]),
}

impl<'a> Shape<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => Shape::Mapping(map),
            Value::Array(items) => Shape::Sequence(items),
            other => Shape::Scalar(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_once() {
        assert!(matches!(Shape::of(&json!({"a": 1})), Shape::Mapping(_)));
        assert!(matches!(Shape::of(&json!([1, 2])), Shape::Sequence(_)));
        assert!(matches!(Shape::of(&json!(3)), Shape::Scalar(_)));
        assert!(matches!(Shape::of(&json!(null)), Shape::Scalar(_)));
    }
}
