//! Embedded schema migrations.
//!
//! Files under `migrations/` are compiled in and applied in version order.
//! `schema_version` holds one row per applied version. Each migration and its
//! version stamp commit together, so a crash never leaves a half-applied step.

use rusqlite::Connection;

const MIGRATIONS: &[(u32, &str)] = &[
    (1, include_str!("migrations/001_baseline.sql")),
    (2, include_str!("migrations/002_notes_and_passwords.sql")),
];

fn latest_known() -> u32 {
    MIGRATIONS.iter().map(|(v, _)| *v).max().unwrap_or(0)
}

fn applied_version(conn: &Connection) -> Result<u32, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("schema_version: {}", e))?;

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| format!("reading schema version: {}", e))
}

/// Hot copy to `<db>.v<version>.bak` before touching an existing schema.
fn snapshot(conn: &Connection, version: u32) -> Result<(), String> {
    let Some(path) = conn.path().filter(|p| !p.is_empty()) else {
        return Ok(());
    };
    let target = format!("{}.v{}.bak", path, version);

    let mut dest = Connection::open(&target).map_err(|e| format!("opening {}: {}", target, e))?;
    rusqlite::backup::Backup::new(conn, &mut dest)
        .and_then(|backup| backup.step(-1).map(|_| ()))
        .map_err(|e| format!("snapshot to {}: {}", target, e))?;

    log::info!("Snapshot of schema v{} written to {}", version, target);
    Ok(())
}

/// Bring the schema up to date. Returns how many migrations ran.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    let current = applied_version(conn)?;
    let latest = latest_known();

    if current > latest {
        return Err(format!(
            "database schema v{} is newer than this build understands (v{}); upgrade ScheduleMate",
            current, latest
        ));
    }
    if current == latest {
        return Ok(0);
    }
    if current > 0 {
        snapshot(conn, current)?;
    }

    let mut applied = 0;
    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| format!("v{}: {}", version, e))?;
        tx.execute_batch(sql)
            .and_then(|_| tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version]))
            .and_then(|_| tx.commit())
            .map_err(|e| format!("v{}: {}", version, e))?;
        log::info!("Schema migrated to v{}", version);
        applied += 1;
    }
    Ok(applied)
}
