// sqlx::Error -> AppError
// (orphan rules keep the From impl out of core)

use stepwise_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code() {
            Some(code) => match code.as_ref() {
                // SQLite result codes: https://www.sqlite.org/rescode.html
                "2067" | "1555" => AppError::Persistence(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "5" => AppError::Persistence(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Persistence(format!("Database full: {}", db_err.message())),
                other => AppError::Persistence(format!(
                    "Database error [{}]: {}",
                    other,
                    db_err.message()
                )),
            },
            None => AppError::Persistence(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Persistence(format!("Column not found: {}", col))
        }
        _ => AppError::Persistence(err.to_string()),
    }
}
