use serde_json::Value;
use thiserror::Error;

use super::shape::Shape;

pub const DEFAULT_SEPARATOR: &str = "__";
pub const DEFAULT_MAX_DEPTH: usize = 32;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("nesting deeper than {max_depth} levels at `{path}`")]
    DepthExceeded { path: String, max_depth: usize },
}

/// Walks an arbitrarily nested document and emits `(joined_path, scalar)`
/// rows, carrying an explicit path accumulator bounded by `max_depth`.
///
/// Sequence elements are keyed by their `source` field when one is
/// present, by position otherwise, so rows from tagged lists keep a
/// stable column name across documents.
pub struct Flattener {
    separator: String,
    max_depth: usize,
}

impl Default for Flattener {
    fn default() -> Self {
        Self::new(DEFAULT_SEPARATOR, DEFAULT_MAX_DEPTH)
    }
}

impl Flattener {
    pub fn new(separator: impl Into<String>, max_depth: usize) -> Self {
        Self {
            separator: separator.into(),
            max_depth,
        }
    }

    pub fn flatten(&self, doc: &Value) -> Result<Vec<(String, Value)>, FlattenError> {
        let mut rows = Vec::new();
        let mut path = Vec::new();
        self.walk(doc, &mut path, &mut rows)?;
        Ok(rows)
    }

    fn walk(
        &self,
        value: &Value,
        path: &mut Vec<String>,
        rows: &mut Vec<(String, Value)>,
    ) -> Result<(), FlattenError> {
        if path.len() > self.max_depth {
            return Err(FlattenError::DepthExceeded {
                path: path.join(&self.separator),
                max_depth: self.max_depth,
            });
        }
        match Shape::of(value) {
            Shape::Scalar(scalar) => {
                rows.push((path.join(&self.separator), scalar.clone()));
            }
            Shape::Mapping(map) => {
                for (key, child) in map {
                    path.push(key.clone());
                    self.walk(child, path, rows)?;
                    path.pop();
                }
            }
            Shape::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    let key = item
                        .get("source")
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                        .unwrap_or_else(|| index.to_string());
                    path.push(key);
                    self.walk(item, path, rows)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }
}

/// Look up a nested field by a separator-joined path, e.g. `country__iso`.
/// Descent stops early if a non-mapping is reached; the last value found
/// is returned. `None` only when a named field is absent.
pub fn get_path<'a>(data: &'a Value, fields: &str, separator: &str) -> Option<&'a Value> {
    let mut current = data;
    for field in fields.split(separator) {
        match current {
            Value::Object(map) => current = map.get(field)?,
            _ => return Some(current),
        }
    }
    Some(current)
}
