use rusqlite::params;

/// Populate dim_month with months 1-12. Called on DB open; skips rows that
/// already exist.
pub fn ensure_dim_month(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    let existing: i64 = conn.query_row("SELECT COUNT(*) FROM dim_month", [], |row| row.get(0))?;
    if existing == 12 {
        return Ok(());
    }

    let mut stmt = conn.prepare("INSERT OR IGNORE INTO dim_month (month) VALUES (?1)")?;
    for month in 1..=12u32 {
        stmt.execute(params![month])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_dim_month_is_idempotent() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE dim_month (month INTEGER PRIMARY KEY)")
            .unwrap();

        ensure_dim_month(&conn).unwrap();
        ensure_dim_month(&conn).unwrap();

        let (count, min, max): (i64, i64, i64) = conn
            .query_row("SELECT COUNT(*), MIN(month), MAX(month) FROM dim_month", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!((count, min, max), (12, 1, 12));
    }
}
