//! `.`-prefixed meta statements handled before the query engine.

use crate::command::{Command, CommandMap, CommandResult};
use crate::dispatch::Dispatcher;
use logshell_types::{ErrorKind, HelpText};
use rusqlite::params_from_iter;

pub fn register(commands: &mut CommandMap) {
    commands.insert(Command::new(
        HelpText::sql(".tables", "List the tables and views in the database"),
        sql_cmd_tables,
    ));
    commands.insert(Command::new(
        HelpText::sql(".schema", "Show the statements used to create tables and views")
            .with_optional_parameter("table", "Only show the schema of this table")
            .with_example(";.schema all_logs"),
        sql_cmd_schema,
    ));
}

fn query_column(d: &Dispatcher, sql: &str, params: &[&str]) -> Result<Vec<String>, rusqlite::Error> {
    let mut stmt = d.db.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?;
    rows.collect()
}

fn sql_cmd_tables(d: &mut Dispatcher, _cmdline: &str, _args: &[String]) -> CommandResult {
    let names = query_column(
        d,
        "SELECT name FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        &[],
    )
    .map_err(|e| d.ctx.make_error(ErrorKind::EngineError, e.to_string()))?;
    Ok(names.join("\n"))
}

fn sql_cmd_schema(d: &mut Dispatcher, _cmdline: &str, args: &[String]) -> CommandResult {
    let result = match args.get(1) {
        Some(table) => query_column(
            d,
            "SELECT sql FROM sqlite_master WHERE sql IS NOT NULL AND tbl_name = ?1 ORDER BY type DESC, name",
            &[table.as_str()],
        ),
        None => query_column(
            d,
            "SELECT sql FROM sqlite_master WHERE sql IS NOT NULL AND name NOT LIKE 'sqlite_%' \
             ORDER BY tbl_name, type DESC, name",
            &[],
        ),
    };
    let statements = result.map_err(|e| d.ctx.make_error(ErrorKind::EngineError, e.to_string()))?;

    if statements.is_empty()
        && let Some(table) = args.get(1)
    {
        return Err(d
            .ctx
            .make_error(ErrorKind::CommandFailed, format!("unknown table -- {}", table)));
    }
    Ok(statements
        .iter()
        .map(|s| format!("{};", s))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use crate::testing::dispatcher;
    use logshell_types::ErrorKind;

    #[test]
    fn test_tables_and_schema() {
        let mut d = dispatcher();
        d.execute_any(";CREATE TABLE hosts (name TEXT)").unwrap();
        d.execute_any(";CREATE INDEX hosts_name ON hosts (name)").unwrap();
        d.execute_any(";CREATE VIEW v AS SELECT 1").unwrap();

        assert_eq!(d.execute_any(";.tables").unwrap(), "hosts\nv");
        assert_eq!(
            d.execute_any(";.schema hosts").unwrap(),
            "CREATE TABLE hosts (name TEXT);\nCREATE INDEX hosts_name ON hosts (name);"
        );
        assert!(d.ctx().current_help().is_none());
    }

    #[test]
    fn test_schema_unknown_table() {
        let mut d = dispatcher();
        let err = d.execute_any(";.schema nope").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::CommandFailed));
        assert!(err.help.contains(";.schema [table]"));
    }

    #[test]
    fn test_unknown_dot_statement_goes_to_engine() {
        let mut d = dispatcher();
        let err = d.execute_any(";.nonsense").unwrap_err();
        assert_eq!(err.kind, Some(ErrorKind::ParseFailure));
    }
}
