use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("duplicate voucher code: {code}")]
    DuplicateCode { code: String },

    #[error("database error: {message}")]
    Database { message: String },
}

impl StoreError {
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        StoreError::Database {
            message: err.to_string(),
        }
    }

    /// True for a Postgres unique-constraint violation (SQLSTATE 23505).
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
        )
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Database {
            message: message.into(),
        }
    }
}
