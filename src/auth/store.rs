//! Flat-file credential store.
//!
//! File format: one JSON object per line.
//! - `username`, `email`: unique keys
//! - `password`: `$sha256$<salt>$<hash>` (or cleartext for legacy records)
//! - `address`, `phone`: optional, empty when not given
//! - `created_at`: RFC 3339 timestamp
//!
//! The file is read once on open into an in-memory index. After that it is
//! only appended to, except for the startup compaction pass.

use super::error::AuthError;
use super::password;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// A registered user.
///
/// Decoding is lenient so hand-edited records keep their account: numbers and
/// booleans become strings, `null` becomes empty, and an unreadable
/// `created_at` is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "lenient_string")]
    pub username: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub password: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub email: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub address: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub phone: String,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// Candidate fields for a new account, as received from the client.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub password: String,
    pub email: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

/// Outcome of a compaction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    pub kept: usize,
    pub dropped: usize,
}

/// Append-only user store backed by a line-delimited JSON file.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Mutex<Vec<User>>,
}

impl UserStore {
    /// Open (or lazily create) the users file at the given path.
    ///
    /// A missing file is an empty store; it is created on first append.
    /// Malformed lines are skipped here and removed by [`UserStore::compact`].
    pub fn open(path: &Path) -> Result<Self> {
        let users = match fs::read_to_string(path) {
            Ok(content) => {
                let (users, dropped) = parse_records(&content);
                if dropped > 0 {
                    tracing::warn!(
                        dropped,
                        path = %path.display(),
                        "Skipped malformed user records"
                    );
                }
                users
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read users file {}", path.display()));
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of loaded records.
    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }

    /// First record matching `predicate`, in file order.
    pub fn find<P>(&self, predicate: P) -> Option<User>
    where
        P: Fn(&User) -> bool,
    {
        self.users.lock().iter().find(|u| predicate(u)).cloned()
    }

    /// Append one record. Does not check uniqueness; see [`UserStore::register`].
    pub fn append(&self, user: User) -> Result<(), AuthError> {
        let mut users = self.users.lock();
        self.write_line(&user)?;
        users.push(user);
        Ok(())
    }

    /// Rewrite the users file keeping only valid, keyed records.
    ///
    /// Writes to a sibling file first and renames it into place. A missing
    /// users file is left missing.
    pub fn compact(&self) -> Result<CompactionReport> {
        let mut users = self.users.lock();

        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CompactionReport::default()),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read users file {}", self.path.display())
                });
            }
        };

        let (valid, dropped) = parse_records(&content);
        let mut out = String::new();
        for user in &valid {
            out.push_str(&serde_json::to_string(user)?);
            out.push('\n');
        }

        let tmp = compaction_path(&self.path);
        fs::write(&tmp, out).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        let report = CompactionReport {
            kept: valid.len(),
            dropped,
        };
        *users = valid;
        Ok(report)
    }

    /// Register a new account.
    ///
    /// Username conflicts are reported before email conflicts. Only
    /// non-emptiness is enforced; length and format rules live client-side.
    pub fn register(&self, registration: Registration) -> Result<User, AuthError> {
        let username = registration.username.trim();
        let email = registration.email.trim();
        if username.is_empty() || registration.password.is_empty() || email.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let user = User {
            username: username.to_string(),
            password: password::hash(&registration.password),
            email: email.to_string(),
            address: trimmed_or_empty(registration.address.as_deref()),
            phone: trimmed_or_empty(registration.phone.as_deref()),
            created_at: Some(Utc::now()),
        };

        let mut users = self.users.lock();
        if users.iter().any(|u| u.username == user.username) {
            return Err(AuthError::UsernameTaken);
        }
        if users.iter().any(|u| u.email == user.email) {
            return Err(AuthError::EmailTaken);
        }

        self.write_line(&user)?;
        users.push(user.clone());
        drop(users);

        tracing::info!(username = %user.username, "User registered");
        Ok(user)
    }

    /// Authenticate by exact username and password.
    ///
    /// Fails with the same error whether or not the username exists.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }

        let candidates: Vec<User> = self
            .users
            .lock()
            .iter()
            .filter(|u| u.username == username)
            .cloned()
            .collect();

        if candidates.is_empty() {
            password::dummy_verify(password);
            return Err(AuthError::InvalidCredentials);
        }

        candidates
            .into_iter()
            .find(|u| password::verify(password, &u.password))
            .ok_or(AuthError::InvalidCredentials)
    }

    fn write_line(&self, user: &User) -> Result<(), AuthError> {
        let mut line = serde_json::to_string(user).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Parse every non-blank line, returning the valid records and the number of
/// lines dropped.
fn parse_records(content: &str) -> (Vec<User>, usize) {
    let mut users = Vec::new();
    let mut dropped = 0;
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_record(line) {
            Some(user) => users.push(user),
            None => dropped += 1,
        }
    }
    (users, dropped)
}

/// A JSON object with a non-empty `username`; other fields are best effort.
fn parse_record(line: &str) -> Option<User> {
    match serde_json::from_str::<Value>(line).ok()? {
        value @ Value::Object(_) => User::deserialize(value)
            .ok()
            .filter(|u| !u.username.is_empty()),
        _ => None,
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    })
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    })
}

fn compaction_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".compact");
    path.with_file_name(name)
}

fn trimmed_or_empty(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

// ── Tests ───────────────────────────────────────────────────────────
