use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// NOTE: all_logs is derived data. The store keeps every ingested line in
// memory and appends to the table past a watermark, so a version mismatch
// simply drops the tables and the next rebuild repopulates them.

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log_files (
            path TEXT PRIMARY KEY,
            is_virtual BOOLEAN DEFAULT 0,
            line_count INTEGER DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS all_logs (
            log_line INTEGER PRIMARY KEY,
            log_path TEXT NOT NULL,
            log_file_line INTEGER NOT NULL,
            log_body TEXT,
            log_msg_format TEXT,
            FOREIGN KEY (log_path) REFERENCES log_files(path)
        );

        CREATE INDEX IF NOT EXISTS idx_all_logs_format ON all_logs(log_msg_format);
        CREATE INDEX IF NOT EXISTS idx_all_logs_path ON all_logs(log_path);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS all_logs;
        DROP TABLE IF EXISTS log_files;
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_sets_version() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_drops_stale_tables() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE all_logs (stale TEXT); PRAGMA user_version = 99;")
            .unwrap();

        init_schema(&conn).unwrap();

        // The recreated table has the current columns
        conn.execute(
            "INSERT INTO log_files (path) VALUES ('a.log')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO all_logs (log_path, log_file_line, log_body) VALUES ('a.log', 1, 'x')",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
