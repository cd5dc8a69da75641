use crate::storage::{self, StorageError};

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub username: String,
    // The original records store the hash under "password".
    #[serde(rename = "password")]
    pub password_hash: String,
    pub role: Role,
    #[serde(
        rename = "createdBy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by: Option<String>,
}

/// The role-bearing identity handed back to the UI process on login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

#[derive(Debug)]
pub enum UserError {
    AdminExists,
    UsernameTaken,
    Validation(String),
    InvalidCredentials,
    NotFoundOrProtected,
    Hash,
    Storage(StorageError),
}

impl std::fmt::Display for UserError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserError::AdminExists => f.write_str("Admin user already exists"),
            UserError::UsernameTaken => f.write_str("Username already exists"),
            UserError::Validation(message) => f.write_str(message),
            UserError::InvalidCredentials => f.write_str("Invalid username or password"),
            UserError::NotFoundOrProtected => f.write_str("User not found or cannot be deleted"),
            UserError::Hash => f.write_str("failed to hash password"),
            UserError::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl From<StorageError> for UserError {
    fn from(err: StorageError) -> Self {
        UserError::Storage(err)
    }
}

/// Owns the user collection file. Every operation is a whole
/// load-modify-save transaction against that file.
pub struct UserStore {
    path: PathBuf,
}

impl UserStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Vec<UserRecord>, UserError> {
        storage::ensure_collection(&self.path)?;
        Ok(storage::load_collection(&self.path)?)
    }

    fn save(&self, users: &[UserRecord]) -> Result<(), UserError> {
        Ok(storage::save_collection(&self.path, users)?)
    }

    pub fn admin_exists(&self) -> Result<bool, UserError> {
        let users = self.load()?;
        Ok(users.iter().any(|user| user.role == Role::Admin))
    }

    /// One-time admin registration. The singleton check runs against the
    /// same loaded collection the write appends to, so a second call can
    /// never slip past it.
    pub fn register_admin(&self, username: &str, password: &str) -> Result<UserRecord, UserError> {
        let mut users = self.load()?;
        // The singleton check wins over everything else: once an admin
        // exists, registration is closed no matter what was submitted.
        if users.iter().any(|user| user.role == Role::Admin) {
            return Err(UserError::AdminExists);
        }

        validate_username(username).map_err(UserError::Validation)?;
        validate_password(password).map_err(UserError::Validation)?;
        if users.iter().any(|user| user.username == username) {
            return Err(UserError::UsernameTaken);
        }

        let record = UserRecord {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role: Role::Admin,
            created_by: None,
        };
        users.push(record.clone());
        self.save(&users)?;
        Ok(record)
    }

    pub fn create_moderator(
        &self,
        username: &str,
        password: &str,
        created_by: &str,
    ) -> Result<UserRecord, UserError> {
        validate_username(username).map_err(UserError::Validation)?;
        validate_password(password).map_err(UserError::Validation)?;

        let mut users = self.load()?;
        if users.iter().any(|user| user.username == username) {
            return Err(UserError::UsernameTaken);
        }

        let created_by = created_by.trim();
        let record = UserRecord {
            username: username.to_string(),
            password_hash: hash_password(password)?,
            role: Role::Moderator,
            created_by: (!created_by.is_empty()).then(|| created_by.to_string()),
        };
        users.push(record.clone());
        self.save(&users)?;
        Ok(record)
    }

    /// Removes a moderator by name. Admin records are never removed, even on
    /// an exact username match.
    pub fn delete_moderator(&self, username: &str) -> Result<(), UserError> {
        let users = self.load()?;
        let initial_len = users.len();
        let remaining: Vec<UserRecord> = users
            .into_iter()
            .filter(|user| user.role == Role::Admin || user.username != username)
            .collect();

        if remaining.len() == initial_len {
            return Err(UserError::NotFoundOrProtected);
        }

        self.save(&remaining)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<UserRecord>, UserError> {
        self.load()
    }

    /// Verifies credentials. Failures never reveal whether the username
    /// existed.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<Identity, UserError> {
        let users = self.load()?;
        let Some(user) = users.iter().find(|user| user.username == username) else {
            return Err(UserError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash) {
            return Err(UserError::InvalidCredentials);
        }

        Ok(Identity {
            username: user.username.clone(),
            role: user.role,
        })
    }
}

fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| UserError::Hash)
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &hash)
        .is_ok()
}

pub(crate) fn validate_username(username: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }
    if username.len() < 4 {
        return Err("Username must be at least 4 characters long".to_string());
    }
    if !username
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
    {
        return Err(
            "Username can only contain letters, numbers, underscore and hyphen".to_string(),
        );
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    if password.len() < 8 {
        return Err("Password must be at least 8 characters long".to_string());
    }
    if !password.chars().any(|ch| ch.is_ascii_uppercase()) {
        return Err("Password must contain at least one uppercase letter".to_string());
    }
    if !password.chars().any(|ch| ch.is_ascii_lowercase()) {
        return Err("Password must contain at least one lowercase letter".to_string());
    }
    if !password.chars().any(|ch| ch.is_ascii_digit()) {
        return Err("Password must contain at least one number".to_string());
    }
    if !password.chars().any(|ch| PASSWORD_SYMBOLS.contains(ch)) {
        return Err("Password must contain at least one special character".to_string());
    }
    Ok(())
}
