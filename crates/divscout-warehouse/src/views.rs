//! Database views for reporting over the discovered universe.

use ::duckdb::Connection;

/// Create reporting views.
///
/// - `vw_method_coverage`: number of symbols each discovery method contributed
/// - `vw_repeat_exclusions`: symbols that failed validation at least three times
///
/// # Errors
/// Returns an error if the view creation SQL fails to execute.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW vw_method_coverage AS
SELECT
    method,
    COUNT(*)::BIGINT AS symbol_count
FROM (
    SELECT UNNEST(string_split(discovery_methods, ',')) AS method
    FROM dividend_symbols
)
WHERE method <> ''
GROUP BY method;

CREATE OR REPLACE VIEW vw_repeat_exclusions AS
SELECT
    symbol,
    reason,
    source,
    excluded_at,
    updated_at,
    validation_attempts
FROM excluded_symbols
WHERE validation_attempts >= 3;
",
    )?;

    Ok(())
}
