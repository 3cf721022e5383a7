//! User allow-list: who may talk to the model.
//!
//! Every sender is recorded on first contact with `allowed = false`; an
//! operator flips the flag (`lmgram users allow <id>`). The list is stored as
//! a pretty-printed JSON array of `{id, username, allowed}` objects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use lmgram_core::error::PersistenceError;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// A known Telegram user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub allowed: bool,
}

/// Result of checking a sender against the allowlist.
#[derive(Debug, Clone, PartialEq)]
pub enum SenderCheckResult {
    /// Sender is allowed
    Allowed,
    /// Sender is denied
    Denied { sender_id: i64, reason: String },
}

impl SenderCheckResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, SenderCheckResult::Allowed)
    }
}

/// File-backed allow-list. One mutex covers every read and update.
pub struct UserStore {
    path: PathBuf,
    users: Mutex<BTreeMap<i64, BotUser>>,
}

impl UserStore {
    /// Load the list from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let users = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| PersistenceError::Read {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            let list: Vec<BotUser> =
                serde_json::from_str(&content).map_err(|e| PersistenceError::Parse {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            list.into_iter().map(|u| (u.id, u)).collect()
        } else {
            BTreeMap::new()
        };

        info!(path = %path.display(), users = users.len(), "Users loaded");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    /// An empty store that will save to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            users: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<i64, BotUser>> {
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the user's record, creating it (not allowed) on first contact.
    /// A known user's username is refreshed.
    pub fn get_or_register(&self, id: i64, username: &str) -> BotUser {
        register(&mut self.lock(), id, username)
    }

    pub fn get(&self, id: i64) -> Option<BotUser> {
        self.lock().get(&id).cloned()
    }

    /// Set the `allowed` flag, creating the record if the id is new.
    pub fn set_allowed(&self, id: i64, allowed: bool) -> BotUser {
        let mut users = self.lock();
        let user = users.entry(id).or_insert_with(|| BotUser {
            id,
            username: String::new(),
            allowed,
        });
        user.allowed = allowed;
        user.clone()
    }

    /// All users ordered by id.
    pub fn sorted(&self) -> Vec<BotUser> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Write the list to disk as a pretty JSON array.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let users = self.lock();
        self.write_locked(&users)
    }

    /// Serialize and replace the file while the caller holds the lock, so
    /// concurrent saves never interleave or land out of order. The list goes
    /// to a sibling temp file first and is renamed over the old one.
    fn write_locked(&self, users: &BTreeMap<i64, BotUser>) -> Result<(), PersistenceError> {
        let write_err = |reason: String| PersistenceError::Write {
            path: self.path.clone(),
            reason,
        };

        let list: Vec<&BotUser> = users.values().collect();
        let json = serde_json::to_string_pretty(&list).map_err(|e| write_err(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(|e| write_err(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            write_err(e.to_string())
        })
    }

    /// Gate check for an inbound message: record the sender, persist the
    /// list, and report whether the sender may proceed.
    ///
    /// Registration and save happen under one lock. A failed save is logged
    /// and does not change the answer; an unknown sender is never allowed.
    /// This blocks on file I/O; async callers run it on the blocking pool.
    pub fn check_sender(&self, id: i64, username: &str) -> SenderCheckResult {
        let user = {
            let mut users = self.lock();
            let user = register(&mut users, id, username);
            if let Err(e) = self.write_locked(&users) {
                error!(error = %e, "Error saving users");
            }
            user
        };

        if user.allowed {
            SenderCheckResult::Allowed
        } else {
            SenderCheckResult::Denied {
                sender_id: id,
                reason: format!("User '{username}' is not on the allow-list"),
            }
        }
    }
}

fn register(users: &mut BTreeMap<i64, BotUser>, id: i64, username: &str) -> BotUser {
    let user = users.entry(id).or_insert_with(|| {
        debug!(user_id = id, username, "Registering new user");
        BotUser {
            id,
            username: username.to_string(),
            allowed: false,
        }
    });
    user.username = username.to_string();
    user.clone()
}
