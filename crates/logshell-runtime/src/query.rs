use crate::context::{ContextStacks, ExecutionContext};
use crate::dispatch::Dispatcher;
use logshell_types::{ERROR_MARKER, ErrorKind, UserMessage, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Null;
use rusqlite::{Connection, Statement};
use std::time::{Duration, Instant};

/// Canned query behind the `.msgformats` alias.
pub const MSG_FORMAT_STMT: &str = "SELECT count(*) AS total, min(log_line) AS log_line, log_msg_format \
     FROM all_logs GROUP BY log_msg_format ORDER BY total DESC";

const MULTI_ROW_HINT: &str =
    "Press y/Y to move forward/backward through query results in the log view";

static PLAIN_IDENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Summary of a finished query plus an optional hint for the status line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub summary: String,
    pub alt_msg: String,
}

impl QueryOutput {
    pub(crate) fn from_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            alt_msg: String::new(),
        }
    }
}

/// Install the SQL functions the engine relies on.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "raise_error",
        -1,
        FunctionFlags::SQLITE_UTF8,
        |fctx| -> rusqlite::Result<Option<String>> {
            if fctx.is_empty() || fctx.len() > 2 {
                return Err(rusqlite::Error::UserFunctionError(
                    "raise_error() expects a message and an optional reason".into(),
                ));
            }
            let message: String = fctx.get(0)?;
            let mut msg = UserMessage::error(message);
            if fctx.len() == 2 {
                let reason: Option<String> = fctx.get(1)?;
                if let Some(reason) = reason {
                    msg = msg.with_reason(reason);
                }
            }
            let wire = msg
                .to_wire()
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Err(rusqlite::Error::UserFunctionError(wire.into()))
        },
    )
}

/// Column names that can be used as variable names without quoting.
pub fn is_plain_identifier(name: &str) -> bool {
    PLAIN_IDENT.is_match(name)
}

/// Turn an engine failure into a diagnostic, decoding structured errors.
fn engine_error(ctx: &ExecutionContext, err: &rusqlite::Error) -> UserMessage {
    let text = err.to_string();
    if let Some(encoded) = text.strip_prefix(ERROR_MARKER) {
        match UserMessage::from_json(encoded) {
            Ok(mut msg) => {
                if msg.kind.is_none() {
                    msg.kind = Some(ErrorKind::StructuredEngineError);
                }
                if msg.snippets.is_empty() {
                    msg = msg.with_snippet(ctx.current_source().clone());
                }
                return msg;
            }
            Err(decode_err) => {
                tracing::warn!("undecodable structured error: {}", decode_err);
            }
        }
    }
    ctx.make_error(ErrorKind::EngineError, text)
}

fn format_elapsed(elapsed: Duration) -> String {
    format!(
        "{}.{:03}",
        elapsed.as_secs(),
        elapsed.subsec_millis().max(1)
    )
}

impl Dispatcher {
    /// Run a `;` statement and summarize its results.
    pub fn execute_sql(&mut self, sql: &str) -> Result<String, UserMessage> {
        self.run_query(sql).map(|out| out.summary)
    }

    pub fn run_query(&mut self, sql: &str) -> Result<QueryOutput, UserMessage> {
        let mut stmt_str = sql.trim();
        tracing::info!("executing SQL: {}", stmt_str);

        if stmt_str.starts_with('.') {
            let args: Vec<String> = stmt_str.split_whitespace().map(String::from).collect();
            if let Some(cmd) = self.sql_commands.get(&args[0]) {
                let (help, func) = (cmd.help.clone(), cmd.func);
                let mut this = self.enter_help(help);
                return func(&mut this, stmt_str, &args).map(QueryOutput::from_summary);
            }
        }

        if stmt_str == ".msgformats" {
            stmt_str = MSG_FORMAT_STMT;
        }
        if stmt_str.is_empty() {
            return Err(self
                .ctx
                .make_error(ErrorKind::NoCommandGiven, "no statement given"));
        }

        let start = Instant::now();
        let mut stmt = self
            .db
            .prepare(stmt_str)
            .map_err(|e| self.ctx.make_error(ErrorKind::ParseFailure, e.to_string()))?;

        let readonly = stmt.readonly();
        if self.ctx.is_read_only() && !readonly {
            return Err(self.ctx.make_error(
                ErrorKind::ReadOnlyViolation,
                format!("modifying statements are not allowed in this context: {}", sql),
            ));
        }

        let geometry = self.host.terminal_size();
        bind_parameters(&self.ctx, geometry, &mut stmt)
            .map_err(|e| engine_error(&self.ctx, &e))?;

        self.results
            .on_row(&self.ctx, None)
            .map_err(|e| engine_error(&self.ctx, &e))?;
        {
            let mut rows = stmt.raw_query();
            loop {
                match rows.next() {
                    Ok(Some(row)) => self
                        .results
                        .on_row(&self.ctx, Some(row))
                        .map_err(|e| engine_error(&self.ctx, &e))?,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::error!("query step failed: {}", e);
                        return Err(engine_error(&self.ctx, &e));
                    }
                }
            }
        }
        drop(stmt);
        let elapsed = start.elapsed();

        self.store_first_row();

        let results = self.results.results();
        let output = match results.rows.len() {
            0 if readonly => QueryOutput::from_summary("No rows matched"),
            0 => QueryOutput::default(),
            1 => {
                let row = &results.rows[0];
                if results.headers.len() == 1 {
                    QueryOutput::from_summary(row[0].clone().unwrap_or_default())
                } else {
                    let pairs: Vec<String> = results
                        .headers
                        .iter()
                        .zip(row)
                        .map(|(h, v)| format!("{}={}", h.name, v.as_deref().unwrap_or("")))
                        .collect();
                    QueryOutput::from_summary(pairs.join("; "))
                }
            }
            count => QueryOutput {
                summary: format!(
                    "{} rows matched in {} seconds",
                    count,
                    format_elapsed(elapsed)
                ),
                alt_msg: MULTI_ROW_HINT.to_string(),
            },
        };
        Ok(output)
    }

    /// Copy the first row's non-NULL values into the current local scope.
    fn store_first_row(&mut self) {
        if self.ctx.is_dry_run() {
            return;
        }
        let results = self.results.results();
        let Some(first) = results.rows.first() else {
            return;
        };
        let values: Vec<(String, String)> = results
            .headers
            .iter()
            .zip(first)
            .filter(|(h, _)| is_plain_identifier(&h.name))
            .filter_map(|(h, v)| v.clone().map(|v| (h.name.clone(), v)))
            .collect();
        for (name, value) in values {
            self.ctx.set_local_var(name, value);
        }
    }
}

/// Bind every placeholder of `stmt` from the context.
fn bind_parameters(
    ctx: &ExecutionContext,
    geometry: Option<(u16, u16)>,
    stmt: &mut Statement<'_>,
) -> rusqlite::Result<()> {
    for idx in 1..=stmt.parameter_count() {
        let Some(name) = stmt.parameter_name(idx).map(str::to_string) else {
            tracing::warn!("could not bind anonymous parameter #{}", idx);
            stmt.raw_bind_parameter(idx, Null)?;
            continue;
        };

        if let Some(value) = ctx.overrides().get(&name) {
            stmt.raw_bind_parameter(idx, value)?;
            continue;
        }

        if let Some(var) = name.strip_prefix('$') {
            let from_terminal = match (var, geometry) {
                ("LINES", Some((lines, _))) => Some(lines.to_string()),
                ("COLS", Some((_, cols))) => Some(cols.to_string()),
                _ => None,
            };
            if let Some(value) = from_terminal.or_else(|| ctx.lookup_var(var)) {
                stmt.raw_bind_parameter(idx, value)?;
                continue;
            }
        } else if let Some(field) = name.strip_prefix(':')
            && let Some(lv) = ctx.line_values().iter().find(|lv| lv.name == field)
        {
            match &lv.value {
                Value::Null => stmt.raw_bind_parameter(idx, Null)?,
                Value::Boolean(b) => stmt.raw_bind_parameter(idx, *b as i64)?,
                Value::Integer(i) => stmt.raw_bind_parameter(idx, *i)?,
                Value::Float(f) => stmt.raw_bind_parameter(idx, *f)?,
                Value::Text(s) => stmt.raw_bind_parameter(idx, s)?,
            }
            continue;
        }

        tracing::warn!("could not bind variable: {}", name);
        stmt.raw_bind_parameter(idx, Null)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::dispatcher;
    use logshell_types::LineValue;

    #[test]
    fn test_single_cell_summary() {
        let mut d = dispatcher();
        assert_eq!(d.execute_sql("SELECT 42").unwrap(), "42");
    }

    #[test]
    fn test_single_row_pairs() {
        let mut d = dispatcher();
        assert_eq!(d.execute_sql("SELECT 1 AS a, 2 AS b").unwrap(), "a=1; b=2");
    }

    #[test]
    fn test_no_rows_on_readonly_statement() {
        let mut d = dispatcher();
        assert_eq!(
            d.execute_sql("SELECT 1 WHERE 0").unwrap(),
            "No rows matched"
        );
        assert_eq!(d.execute_sql("CREATE TABLE t (x)").unwrap(), "");
    }

    #[test]
    fn test_multi_row_summary_and_hint() {
        let mut d = dispatcher();
        let out = d
            .run_query("SELECT 1 UNION ALL SELECT 2 UNION ALL SELECT 3")
            .unwrap();
        assert!(
            out.summary.starts_with("3 rows matched in "),
            "{}",
            out.summary
        );
        assert!(out.summary.ends_with(" seconds"));
        assert!(!out.summary.contains(".000 "));
        assert_eq!(out.alt_msg, MULTI_ROW_HINT);
    }

    #[test]
    fn test_first_row_written_to_local_scope() {
        let mut d = dispatcher();
        d.execute_sql("SELECT 'web1' AS host, NULL AS gone, 3 AS \"two words\"")
            .unwrap();
        assert_eq!(d.ctx().local_vars().get("host").map(String::as_str), Some("web1"));
        assert!(d.ctx().local_vars().get("gone").is_none());
        assert!(d.ctx().local_vars().get("two words").is_none());
    }

    #[test]
    fn test_dry_run_skips_writeback() {
        let mut d = dispatcher();
        d.ctx_mut().set_dry_run(true);
        d.execute_sql("SELECT 'web1' AS host").unwrap();
        assert!(d.ctx().local_vars().get("host").is_none());
    }

    #[test]
    fn test_binding_precedence() {
        let mut d = dispatcher();
        d.ctx_mut().set_global_var("who", "global");
        d.ctx_mut().set_override("$who", "override");
        assert_eq!(d.execute_sql("SELECT $who").unwrap(), "override");

        d.ctx_mut().clear_overrides();
        assert_eq!(d.execute_sql("SELECT $who").unwrap(), "global");

        d.ctx_mut().set_local_var("who", "local");
        assert_eq!(d.execute_sql("SELECT $who").unwrap(), "local");
    }

    #[test]
    fn test_line_values_bind_natively() {
        let mut d = dispatcher();
        d.ctx_mut().set_line_values(vec![
            LineValue::new("status", Value::Integer(500)),
            LineValue::new("ok", Value::Boolean(false)),
            LineValue::new("path", Value::Text("/a".to_string())),
        ]);
        assert_eq!(
            d.execute_sql("SELECT typeof(:status), :ok, :path").unwrap(),
            "typeof(:status)=integer; :ok=0; :path=/a"
        );
    }

    #[test]
    fn test_unbound_variable_is_null() {
        let mut d = dispatcher();
        assert_eq!(
            d.execute_sql("SELECT $logshell_unset_var IS NULL AS missing").unwrap(),
            "1"
        );
    }

    #[test]
    fn test_terminal_geometry_variables() {
        let mut d = dispatcher();
        assert_eq!(d.execute_sql("SELECT $LINES, $COLS").unwrap(), "$LINES=24; $COLS=80");
    }

    #[test]
    fn test_parse_failure() {
        let mut d = dispatcher();
        let err = d.execute_sql("SELEKT 1").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ParseFailure));
        assert!(err.message.contains("syntax error"), "{}", err.message);
    }

    #[test]
    fn test_empty_statement() {
        let mut d = dispatcher();
        let err = d.execute_sql("   ").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::NoCommandGiven));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut d = dispatcher();
        d.ctx_mut()
            .set_permissions(crate::context::Permissions::ReadOnly);
        let err = d.execute_sql("CREATE TABLE t (x)").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ReadOnlyViolation));
        assert_eq!(
            err.message,
            "modifying statements are not allowed in this context: CREATE TABLE t (x)"
        );
        assert_eq!(d.execute_sql("SELECT 1").unwrap(), "1");
    }

    #[test]
    fn test_raise_error_is_structured() {
        let mut d = dispatcher();
        let err = d
            .execute_sql("SELECT raise_error('bad input', 'expected a number')")
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::StructuredEngineError));
        assert_eq!(err.message, "bad input");
        assert_eq!(err.reason, "expected a number");
    }

    #[test]
    fn test_engine_error_keeps_message() {
        let mut d = dispatcher();
        let err = d
            .execute_sql("SELECT json_extract('not json', '$')")
            .unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::EngineError));
        assert!(err.message.contains("malformed JSON"), "{}", err.message);
        assert_eq!(err.snippets[0].source, "command");
    }

    #[test]
    fn test_msgformats_alias() {
        let mut d = dispatcher();
        d.db()
            .execute_batch(
                "CREATE TABLE all_logs (log_line INTEGER PRIMARY KEY, log_path TEXT, \
                 log_file_line INTEGER, log_body TEXT, log_msg_format TEXT); \
                 INSERT INTO all_logs (log_path, log_file_line, log_body, log_msg_format) \
                 VALUES ('a', 1, 'x 1', 'x #'), ('a', 2, 'x 2', 'x #')",
            )
            .unwrap();
        assert_eq!(
            d.execute_sql(".msgformats").unwrap(),
            "total=2; log_line=1; log_msg_format=x #"
        );
    }

    #[test]
    fn test_elapsed_millis_floor() {
        assert_eq!(format_elapsed(Duration::from_micros(10)), "0.001");
        assert_eq!(format_elapsed(Duration::from_millis(2345)), "2.345");
    }
}
