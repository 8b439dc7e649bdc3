use super::{load_json, set_aside_if_corrupt, update_json};
use crate::error::StoreError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Outcome of checking a username/password pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Success,
    NotFound,
    Mismatch,
}

/// Outcome of registering a new user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    Created,
    AlreadyExists,
}

/// Lookup and registration of shell users.
pub trait CredentialStore {
    fn verify(&self, username: &str, password: &str) -> Result<Verification, StoreError>;
    fn create(&mut self, username: &str, password: &str) -> Result<Creation, StoreError>;
}

/// bcrypt hash of a password: salt and cost are embedded in the string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(password: &str) -> Result<Self, StoreError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map(PasswordHash)
            .map_err(StoreError::Hash)
    }

    /// A stored hash that cannot be parsed matches no password.
    pub fn matches(&self, password: &str) -> bool {
        match bcrypt::verify(password, &self.0) {
            Ok(matched) => matched,
            Err(e) => {
                warn!("unusable password hash: {e}");
                false
            }
        }
    }
}

/// Users kept for the lifetime of the process only.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Users,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryUserStore {
    fn verify(&self, username: &str, password: &str) -> Result<Verification, StoreError> {
        Ok(match self.users.get(username) {
            None => Verification::NotFound,
            Some(hash) if hash.matches(password) => Verification::Success,
            Some(_) => Verification::Mismatch,
        })
    }

    fn create(&mut self, username: &str, password: &str) -> Result<Creation, StoreError> {
        if self.users.contains_key(username) {
            return Ok(Creation::AlreadyExists);
        }
        self.users
            .insert(username.to_string(), PasswordHash::new(password)?);
        Ok(Creation::Created)
    }
}

type Users = BTreeMap<String, PasswordHash>;

/// Users persisted as a JSON object `{ username: bcrypt-hash }`.
///
/// The file is read on every lookup and re-read before every change, so
/// users added by another shell sharing the data directory are seen and
/// kept.
#[derive(Debug)]
pub struct JsonUserStore {
    path: PathBuf,
}

impl JsonUserStore {
    /// Opens the store at `path`; a missing file is an empty store and a
    /// malformed one is moved aside with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        set_aside_if_corrupt::<Users>(&path)?;
        Ok(Self { path })
    }
}

impl CredentialStore for JsonUserStore {
    fn verify(&self, username: &str, password: &str) -> Result<Verification, StoreError> {
        let users: Users = load_json(&self.path)?;
        MemoryUserStore { users }.verify(username, password)
    }

    fn create(&mut self, username: &str, password: &str) -> Result<Creation, StoreError> {
        update_json(&self.path, |users: &mut Users| {
            let mut store = MemoryUserStore {
                users: std::mem::take(users),
            };
            let created = store.create(username, password);
            *users = store.users;
            created
        })
    }
}
