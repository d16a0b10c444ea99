use ::duckdb::{params, Connection};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

// The excluded_symbols layout is shared with other consumers of the database and
// must not drift. DuckDB has no triggers, so writers touch updated_at themselves.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_excluded_symbols",
        sql: r#"
CREATE TABLE IF NOT EXISTS excluded_symbols (
    symbol VARCHAR(20) PRIMARY KEY,
    reason TEXT,
    excluded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    source VARCHAR(50),
    validation_attempts INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_excluded_symbols_symbol ON excluded_symbols(symbol);
CREATE INDEX IF NOT EXISTS idx_excluded_symbols_excluded_at ON excluded_symbols(excluded_at);
"#,
    },
    Migration {
        version: "0002_symbol_universe",
        sql: r#"
CREATE TABLE IF NOT EXISTS dividend_symbols (
    ticker VARCHAR(20) PRIMARY KEY,
    instrument_type TEXT NOT NULL,
    discovery_methods TEXT NOT NULL,
    name TEXT,
    price DOUBLE,
    dividend_yield DOUBLE,
    market_cap DOUBLE,
    sector TEXT,
    exchange TEXT,
    listing_date DATE,
    first_seen_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    last_seen_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    last_run_id TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS discovery_runs (
    run_id TEXT PRIMARY KEY,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP NOT NULL,
    status TEXT NOT NULL,
    total_unique BIGINT NOT NULL,
    excluded_count BIGINT NOT NULL,
    elapsed_ms BIGINT NOT NULL,
    summary TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_discovery_runs_started_at ON discovery_runs(started_at);
"#,
    },
];

pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params![migration.version],
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params![migration.version],
            )?;
        }
    }

    Ok(())
}
