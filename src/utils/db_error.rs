//! Classification of PostgreSQL driver errors.

/// Unique index guarding one active record per URL.
pub const ACTIVE_URL_CONSTRAINT: &str = "shorted_links_active_url_key";

/// Primary key on the token column.
pub const TOKEN_CONSTRAINT: &str = "shorted_links_pkey";

/// Returns true if `e` is a unique violation (SQLSTATE 23505) on `constraint`.
pub fn is_unique_violation_on(e: &sqlx::Error, constraint: &str) -> bool {
    let Some(db_err) = e.as_database_error() else {
        return false;
    };

    if !db_err.is_unique_violation() {
        return false;
    }

    db_err.constraint() == Some(constraint)
}
