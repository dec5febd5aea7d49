use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("user already exists: {0}")]
    UserExists(String),

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("invalid password")]
    InvalidPassword,

    #[error("{0} not found: {1}")]
    RowNotFound(&'static str, i64),

    #[error("password hashing error: {0}")]
    Hash(String),
}
