use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use password_hash::rand_core::OsRng;
use password_hash::SaltString;
use rusqlite::Connection;

use crate::error::DbError;

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
}

pub struct UserRepo<'a> {
    conn: &'a Connection,
}

impl<'a> UserRepo<'a> {
    pub(crate) fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Look up a user by name (case-insensitive).
    pub fn get_by_username(&self, username: &str) -> Result<Option<User>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username FROM users WHERE username = ?1")?;
        let result = stmt.query_row(rusqlite::params![username], |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
            })
        });
        match result {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a user with a freshly hashed password.
    pub fn create(&self, username: &str, password: &str) -> Result<User, DbError> {
        if self.get_by_username(username)?.is_some() {
            return Err(DbError::UserExists(username.to_string()));
        }
        let hash = hash_password(password)?;
        self.conn.execute(
            "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
            rusqlite::params![username, hash],
        )?;
        Ok(User {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
        })
    }

    /// Check a password against the stored hash.
    pub fn verify_password(&self, username: &str, password: &str) -> Result<User, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, username, password_hash FROM users WHERE username = ?1")?;
        let result = stmt.query_row(rusqlite::params![username], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        });
        let (id, username, hash) = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(DbError::UserNotFound(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        verify_password(password, &hash)?;
        Ok(User { id, username })
    }
}

fn hash_password(password: &str) -> Result<String, DbError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| DbError::Hash(e.to_string()))
}

fn verify_password(password: &str, hash: &str) -> Result<(), DbError> {
    let parsed = PasswordHash::new(hash).map_err(|e| DbError::Hash(e.to_string()))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| DbError::InvalidPassword)
}
