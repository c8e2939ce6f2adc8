use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde_json::Value;

use crate::aggregate::Flattener;
use crate::error::CollectError;

/// Flattens nested JSON documents into rows and writes them as one CSV
/// file. Columns appear in first-seen order, after any pinned leading
/// columns; cells missing from a document are left empty.
pub struct CsvExporter {
    flattener: Flattener,
    pinned: Vec<String>,
}

impl CsvExporter {
    pub fn new(pinned: Vec<String>) -> Self {
        Self {
            flattener: Flattener::default(),
            pinned,
        }
    }

    /// Returns the number of data rows written.
    pub fn export(&self, docs: &[Value], path: &Path) -> Result<usize, CollectError> {
        let mut headers: Vec<String> = self.pinned.clone();
        let mut seen: HashSet<String> = headers.iter().cloned().collect();
        let mut rows: Vec<HashMap<String, String>> = Vec::with_capacity(docs.len());

        for doc in docs {
            let mut row = HashMap::new();
            for (key, value) in self.flattener.flatten(doc)? {
                if seen.insert(key.clone()) {
                    headers.push(key.clone());
                }
                row.insert(key, render_scalar(&value));
            }
            rows.push(row);
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&headers)?;
        for row in &rows {
            writer.write_record(
                headers
                    .iter()
                    .map(|h| row.get(h).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.flush()?;
        Ok(rows.len())
    }
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn exports_union_of_columns() {
        let docs = vec![
            json!({
                "country": "NP",
                "org": "Togglecorp",
                "meta": {"a": "hello-a", "b": "hello-b"},
            }),
            json!({
                "country": "IN",
                "org": "Togglecorp",
                "extra": "only here",
            }),
        ];

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let written = CsvExporter::new(vec!["org".to_string(), "country".to_string()])
            .export(&docs, &path)
            .unwrap();
        assert_eq!(written, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "org,country,meta__a,meta__b,extra"
        );
        assert_eq!(lines.next().unwrap(), "Togglecorp,NP,hello-a,hello-b,");
        assert_eq!(lines.next().unwrap(), "Togglecorp,IN,,,only here");
    }
}
