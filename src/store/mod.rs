//! Flat-file persistence.
//!
//! Every user is one pretty-printed JSON document under `<data_dir>/users/`.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the record, so readers never observe a half-written file.

mod activity;

use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::core::{ContactMessage, ContactMessages, User};
use crate::error::{Error, Result};

const USERS_DIR: &str = "users";
const LOGS_DIR: &str = "logs";
const CONTACT_MESSAGES_FILE: &str = "contact_messages.json";

#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Opens a store rooted at `root`, creating the directory layout if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(USERS_DIR))?;
        fs::create_dir_all(root.join(LOGS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_path(&self, user_id: &str) -> Option<PathBuf> {
        is_safe_id(user_id).then(|| self.root.join(USERS_DIR).join(format!("{user_id}.json")))
    }

    pub fn load_user(&self, user_id: &str) -> Result<Option<User>> {
        let Some(path) = self.user_path(user_id) else {
            return Ok(None);
        };
        read_json(&path)
    }

    pub fn save_user(&self, user: &User) -> Result<()> {
        let path = self
            .user_path(&user.user_id)
            .ok_or_else(|| Error::validation("Invalid user data"))?;
        write_json_atomic(&path, user)?;
        debug!(user_id = %user.user_id, "saved user record");
        Ok(())
    }

    /// All readable user records, oldest registration first.
    pub fn all_users(&self) -> Result<Vec<User>> {
        let mut users = Vec::new();
        for entry in fs::read_dir(self.root.join(USERS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_json::<User>(&path) {
                Ok(Some(user)) => users.push(user),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable user record"),
            }
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(users)
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim();
        Ok(self
            .all_users()?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    /// The owner of `account_number` and the account's index within it.
    pub fn find_by_account_number(&self, account_number: &str) -> Result<Option<(User, usize)>> {
        let account_number = account_number.trim();
        Ok(self.all_users()?.into_iter().find_map(|user| {
            user.account_index(account_number)
                .map(|index| (user, index))
        }))
    }

    /// Loads a user, applies `f` and saves the result only if `f` succeeds.
    pub fn atomic_transaction<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut User) -> Result<T>,
    ) -> Result<T> {
        let mut user = self.load_user(user_id)?.ok_or(Error::UserNotFound)?;
        let out = f(&mut user)?;
        self.save_user(&user)?;
        Ok(out)
    }

    pub fn contact_messages(&self) -> Result<Vec<ContactMessage>> {
        let path = self.root.join(CONTACT_MESSAGES_FILE);
        match read_json::<ContactMessages>(&path) {
            Ok(found) => Ok(found.unwrap_or_default().messages),
            Err(Error::Json(e)) => {
                warn!(error = %e, "contact messages file is corrupt; treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    pub fn append_contact_message(&self, message: ContactMessage) -> Result<()> {
        let path = self.root.join(CONTACT_MESSAGES_FILE);
        let mut inbox: ContactMessages = read_for_append(&path)?;
        inbox.messages.push(message);
        write_json_atomic(&path, &inbox)
    }
}

/// Loads a collection that is about to be extended. A file that does not
/// parse is renamed to `<name>.corrupt-<timestamp>` first, so the rewrite
/// never drops entries it could not read.
fn read_for_append<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match read_json::<T>(path) {
        Ok(found) => Ok(found.unwrap_or_default()),
        Err(Error::Json(e)) => {
            let aside = set_aside(path)?;
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "unreadable file moved aside before append"
            );
            Ok(T::default())
        }
        Err(e) => Err(e),
    }
}

fn set_aside(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", Utc::now().format("%Y%m%dT%H%M%S%.6f")));
    let aside = path.with_file_name(name);
    fs::rename(path, &aside)?;
    Ok(aside)
}

/// Ids become file names, so only uuid-like characters are accepted.
fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}
