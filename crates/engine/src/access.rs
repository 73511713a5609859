//! Operator registry and write-access policy.
//!
//! Operators live in a CSV file `username,password_sha256,role`. Files
//! written by the older dashboard (`Username,Password,Role`) are read as
//! well and rewritten in the current form on the next registration.

use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Manager => "manager",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "manager" => Ok(Role::Manager),
            other => Err(AccessError::UnknownRole(other.to_string())),
        }
    }
}

/// A logged-in operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("operator '{0}' already exists")]
    UsernameTaken(String),
    /// Unknown user or wrong password; the two are not distinguished.
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("unknown role '{0}' (expected user or manager)")]
    UnknownRole(String),
    #[error("operator '{username}' ({role}) does not have write access")]
    Forbidden { username: String, role: Role },
    #[error("operator registry {path}: {reason}")]
    Registry { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRow {
    #[serde(alias = "Username")]
    username: String,
    #[serde(alias = "Password")]
    password_sha256: String,
    #[serde(alias = "Role")]
    role: String,
}

/// Registered operators, backed by a CSV file.
#[derive(Debug)]
pub struct UserRegistry {
    path: PathBuf,
    users: IndexMap<String, (String, Role)>,
}

impl UserRegistry {
    /// Load the registry. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AccessError> {
        let path = path.into();
        let registry_err = |reason: String| AccessError::Registry {
            path: path.display().to_string(),
            reason,
        };

        let mut users = IndexMap::new();
        if path.exists() {
            let mut reader = csv::Reader::from_path(&path).map_err(|e| registry_err(e.to_string()))?;
            for row in reader.deserialize::<UserRow>() {
                let row = row.map_err(|e| registry_err(e.to_string()))?;
                let role = row.role.parse::<Role>()?;
                users.insert(row.username, (row.password_sha256.to_ascii_lowercase(), role));
            }
        }
        Ok(UserRegistry { path, users })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Add an operator and persist the registry.
    pub fn register(&mut self, username: &str, password: &str, role: Role) -> Result<(), AccessError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AccessError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(AccessError::EmptyPassword);
        }
        if self.users.contains_key(username) {
            return Err(AccessError::UsernameTaken(username.to_string()));
        }
        self.users
            .insert(username.to_string(), (hash_password(password), role));
        if let Err(e) = self.save() {
            self.users.shift_remove(username);
            return Err(e);
        }
        info!(username, role = %role, "operator registered");
        Ok(())
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Operator, AccessError> {
        let (hash, role) = self
            .users
            .get(username.trim())
            .ok_or(AccessError::InvalidCredentials)?;
        if *hash != hash_password(password) {
            return Err(AccessError::InvalidCredentials);
        }
        Ok(Operator {
            username: username.trim().to_string(),
            role: *role,
        })
    }

    fn save(&self) -> Result<(), AccessError> {
        let registry_err = |reason: String| AccessError::Registry {
            path: self.path.display().to_string(),
            reason,
        };

        let mut writer = csv::Writer::from_writer(Vec::new());
        for (username, (hash, role)) in &self.users {
            writer
                .serialize(UserRow {
                    username: username.clone(),
                    password_sha256: hash.clone(),
                    role: role.as_str().to_string(),
                })
                .map_err(|e| registry_err(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| registry_err(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| registry_err(e.to_string()))?;
            }
        }
        let tmp = self.path.with_extension("csv.tmp");
        let mut file = File::create(&tmp).map_err(|e| registry_err(e.to_string()))?;
        file.write_all(&bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| registry_err(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| registry_err(e.to_string()))
    }
}

/// Lower-case hex SHA-256 of the password.
pub fn hash_password(password: &str) -> String {
    Sha256::digest(password.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Which roles may change the working set or the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    pub write_roles: Vec<Role>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy {
            write_roles: vec![Role::User, Role::Manager],
        }
    }
}

impl AccessPolicy {
    pub fn can_write(&self, role: Role) -> bool {
        self.write_roles.contains(&role)
    }

    pub fn require_write(&self, operator: &Operator) -> Result<(), AccessError> {
        if self.can_write(operator.role) {
            Ok(())
        } else {
            Err(AccessError::Forbidden {
                username: operator.username.clone(),
                role: operator.role,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn register_then_login() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");

        let mut registry = UserRegistry::open(&path).unwrap();
        assert!(registry.is_empty());
        registry.register("mia", "s3cret", Role::Manager).unwrap();

        let reopened = UserRegistry::open(&path).unwrap();
        let op = reopened.login("mia", "s3cret").unwrap();
        assert_eq!(op.role, Role::Manager);
        assert_eq!(
            reopened.login("mia", "wrong"),
            Err(AccessError::InvalidCredentials)
        );
        assert_eq!(
            reopened.login("nobody", "s3cret"),
            Err(AccessError::InvalidCredentials)
        );
    }

    #[test]
    fn duplicate_username_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = UserRegistry::open(dir.path().join("users.csv")).unwrap();
        registry.register("mia", "a", Role::User).unwrap();
        assert_eq!(
            registry.register("mia", "b", Role::Manager),
            Err(AccessError::UsernameTaken("mia".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn reads_dashboard_users_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.csv");
        fs::write(
            &path,
            format!("Username,Password,Role\nkyaw,{},User\n", hash_password("pw")),
        )
        .unwrap();
        let registry = UserRegistry::open(&path).unwrap();
        assert_eq!(registry.login("kyaw", "pw").unwrap().role, Role::User);
    }

    #[test]
    fn policy_limits_write_roles() {
        let policy = AccessPolicy {
            write_roles: vec![Role::Manager],
        };
        let user = Operator {
            username: "kyaw".into(),
            role: Role::User,
        };
        assert!(matches!(
            policy.require_write(&user),
            Err(AccessError::Forbidden { .. })
        ));
        assert!(AccessPolicy::default().can_write(Role::User));
    }
}
