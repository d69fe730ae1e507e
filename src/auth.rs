use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::http::{HeaderMap, header};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

use crate::{error::AppError, models::CREATOR_MAX_CHARS};

/// Principal
///
/// The verified identity of the caller for one request. Derived by the
/// `Authenticator`, placed in the request extensions by the auth layer and read
/// by the mutating handlers. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub username: String,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed user entry {0:?}, expected `username:secret`")]
    MalformedEntry(String),

    #[error("duplicate user {0:?}")]
    DuplicateUser(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// CredentialStore
///
/// Username to Argon2id PHC hash. Populated once at startup and read-only
/// afterwards, so it is shared behind an `Arc` without locking.
///
/// An unknown username is checked against a dummy hash, so it costs the same
/// as a wrong password and both answer `false`.
pub struct CredentialStore {
    hashes: HashMap<String, String>,
    dummy_hash: String,
}

impl CredentialStore {
    /// Builds a store from `(username, secret)` pairs. Secrets starting with
    /// `$argon2` are taken as PHC hashes; anything else is hashed with `params`.
    pub fn from_pairs<I, U, S>(pairs: I, params: Params) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = (U, S)>,
        U: Into<String>,
        S: AsRef<str>,
    {
        let hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let mut hashes = HashMap::new();

        for (username, secret) in pairs {
            let username = username.into();
            let secret = secret.as_ref();
            if username.is_empty()
                || secret.is_empty()
                || username.contains('\0')
                || username.chars().count() > CREATOR_MAX_CHARS
            {
                return Err(CredentialError::MalformedEntry(username));
            }

            let hash = if secret.starts_with("$argon2") {
                PasswordHash::new(secret).map_err(|e| CredentialError::Hash(e.to_string()))?;
                secret.to_string()
            } else {
                hash_password(&hasher, secret)?
            };

            if hashes.insert(username.clone(), hash).is_some() {
                return Err(CredentialError::DuplicateUser(username));
            }
        }

        let dummy_hash = hash_password(&hasher, "not-a-real-password")?;
        Ok(Self { hashes, dummy_hash })
    }

    /// Parses the `APP_USERS` format: `user:secret` entries separated by `;`.
    pub fn from_spec(spec: &str, params: Params) -> Result<Self, CredentialError> {
        let mut pairs = Vec::new();
        for entry in spec.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (username, secret) = entry
                .split_once(':')
                .ok_or_else(|| CredentialError::MalformedEntry(entry.to_string()))?;
            pairs.push((username.trim().to_string(), secret.to_string()));
        }
        Self::from_pairs(pairs, params)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.hashes.contains_key(username)
    }

    /// Constant-shape check: unknown user and wrong password both return `false`.
    /// CPU-bound; async callers should go through `Authenticator`.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let (stored, known) = match self.hashes.get(username) {
            Some(hash) => (hash.as_str(), true),
            None => (self.dummy_hash.as_str(), false),
        };

        let Ok(parsed) = PasswordHash::new(stored) else {
            return false;
        };

        // Cost parameters come from the PHC string itself.
        let matches = Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();

        known && matches
    }
}

fn hash_password(hasher: &Argon2<'_>, password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CredentialError::Hash(e.to_string()))
}

/// Decodes `Basic <base64(username:password)>`. Any deviation yields `None`.
pub fn parse_basic_credentials(value: &str) -> Option<(String, String)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }

    Some((username.to_string(), password.to_string()))
}

/// Authenticator
///
/// Turns the `Authorization` header into a `Principal`. Called exactly once per
/// protected request by the auth route layer, before the body is read.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<CredentialStore>,
    realm: String,
}

impl Authenticator {
    pub fn new(store: CredentialStore, realm: impl Into<String>) -> Self {
        Self {
            store: Arc::new(store),
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    fn unauthorized(&self) -> AppError {
        AppError::Unauthorized {
            realm: self.realm.clone(),
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AppError> {
        let (username, password) = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic_credentials)
            .ok_or_else(|| self.unauthorized())?;

        // Argon2 verification is CPU-bound.
        let store = self.store.clone();
        let candidate = username.clone();
        let verified = tokio::task::spawn_blocking(move || store.verify(&candidate, &password))
            .await
            .map_err(|e| AppError::Internal(format!("credential check aborted: {e}")))?;

        if !verified {
            tracing::debug!(user = %username, "credential check failed");
            return Err(self.unauthorized());
        }

        Ok(Principal { username })
    }
}
