use crate::context::ExecutionContext;
use rusqlite::{Row, Statement};
use rusqlite::types::ValueRef;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnHeader {
    pub name: String,
    /// Storage class of the first row's value: `integer`, `real`, `text`,
    /// `blob` or `null`.
    pub column_type: String,
    pub graphable: bool,
}

/// Rows of the most recent query, as text.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    pub headers: Vec<ColumnHeader>,
    pub rows: Vec<Vec<Option<String>>>,
    #[serde(skip)]
    key_columns: Vec<String>,
}

impl ResultSet {
    pub fn new(key_columns: Vec<String>) -> Self {
        Self {
            key_columns,
            ..Self::default()
        }
    }

    pub fn clear(&mut self) {
        self.headers.clear();
        self.rows.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: std::io::Write>(&self, out: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(out);
        writer.write_record(self.headers.iter().map(|h| h.name.as_str()))?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| cell.as_deref().unwrap_or("")))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// One JSON object per row, keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let object = self
                    .headers
                    .iter()
                    .zip(row)
                    .map(|(header, cell)| {
                        let value = match cell {
                            None => serde_json::Value::Null,
                            Some(text) => cell_to_json(&header.column_type, text),
                        };
                        (header.name.clone(), value)
                    })
                    .collect();
                serde_json::Value::Object(object)
            })
            .collect();
        serde_json::Value::Array(rows)
    }

    fn capture_headers(&mut self, row: &Row<'_>) -> rusqlite::Result<()> {
        let stmt: &Statement<'_> = row.as_ref();
        for idx in 0..stmt.column_count() {
            let name = stmt.column_name(idx)?.to_string();
            let (column_type, numeric) = match row.get_ref(idx)? {
                ValueRef::Null => ("null", false),
                ValueRef::Integer(_) => ("integer", true),
                ValueRef::Real(_) => ("real", true),
                ValueRef::Text(_) => ("text", false),
                ValueRef::Blob(_) => ("blob", false),
            };
            let graphable = numeric && !self.key_columns.iter().any(|k| k == &name);
            self.headers.push(ColumnHeader {
                name,
                column_type: column_type.to_string(),
                graphable,
            });
        }
        Ok(())
    }

    fn push_row(&mut self, row: &Row<'_>) -> rusqlite::Result<()> {
        let mut cells = Vec::with_capacity(self.headers.len());
        for idx in 0..self.headers.len() {
            cells.push(value_text(row.get_ref(idx)?));
        }
        self.rows.push(cells);
        Ok(())
    }
}

fn cell_to_json(column_type: &str, text: &str) -> serde_json::Value {
    let parsed = match column_type {
        "integer" => text.parse::<i64>().ok().map(serde_json::Value::from),
        "real" => text.parse::<f64>().ok().map(serde_json::Value::from),
        _ => None,
    };
    parsed.unwrap_or_else(|| serde_json::Value::String(text.to_string()))
}

/// Text form of a cell; `None` for SQL NULL.
pub fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) => Some(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Some(format!("<{} byte blob>", b.len())),
    }
}

/// Receives query rows as they are stepped. Called once with `None` before
/// the first row so accumulated results can be dropped.
pub trait RowCallback {
    fn on_row(&mut self, ctx: &ExecutionContext, row: Option<&Row<'_>>) -> rusqlite::Result<()>;

    fn results(&self) -> &ResultSet;
}

impl RowCallback for ResultSet {
    fn on_row(&mut self, _ctx: &ExecutionContext, row: Option<&Row<'_>>) -> rusqlite::Result<()> {
        match row {
            None => {
                self.clear();
                Ok(())
            }
            Some(row) => {
                if self.headers.is_empty() {
                    self.capture_headers(row)?;
                }
                self.push_row(row)
            }
        }
    }

    fn results(&self) -> &ResultSet {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn collect(sql: &str) -> ResultSet {
        let conn = Connection::open_in_memory().unwrap();
        let ctx = ExecutionContext::new();
        let mut results = ResultSet::new(vec!["log_line".to_string()]);
        let mut stmt = conn.prepare(sql).unwrap();
        results.on_row(&ctx, None).unwrap();
        let mut rows = stmt.query([]).unwrap();
        while let Some(row) = rows.next().unwrap() {
            results.on_row(&ctx, Some(row)).unwrap();
        }
        results
    }

    #[test]
    fn test_headers_come_from_first_row() {
        let results = collect(
            "SELECT 1 AS log_line, 2.5 AS took, 'x' AS name, NULL AS gone \
             UNION ALL SELECT 2, 3.5, 'y', 'z'",
        );
        let types: Vec<_> = results
            .headers
            .iter()
            .map(|h| (h.name.as_str(), h.column_type.as_str(), h.graphable))
            .collect();
        assert_eq!(
            types,
            vec![
                ("log_line", "integer", false),
                ("took", "real", true),
                ("name", "text", false),
                ("gone", "null", false),
            ]
        );
        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[0][3], None);
        assert_eq!(results.rows[1][3].as_deref(), Some("z"));
    }

    #[test]
    fn test_csv_and_json_output() {
        let results = collect("SELECT 7 AS n, 'a,b' AS s UNION ALL SELECT NULL, 'c'");

        let mut csv_out = Vec::new();
        results.write_csv(&mut csv_out).unwrap();
        assert_eq!(String::from_utf8(csv_out).unwrap(), "n,s\n7,\"a,b\"\n,c\n");

        assert_eq!(
            results.to_json(),
            serde_json::json!([{"n": 7, "s": "a,b"}, {"n": null, "s": "c"}])
        );
    }

    #[test]
    fn test_none_clears_previous_results() {
        let mut results = collect("SELECT 1 AS a");
        results.on_row(&ExecutionContext::new(), None).unwrap();
        assert!(results.is_empty());
        assert!(results.headers.is_empty());
    }
}
