pub mod client_config;
pub mod fallback_variable;
pub mod generated_asset;
pub mod template_assignment;

#[cfg(test)]
pub(crate) mod test_utils;

/// True when the error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
