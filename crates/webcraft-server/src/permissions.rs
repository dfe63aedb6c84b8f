//! World admins.
//!
//! Persists the admin list as a JSON array of usernames.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

/// Usernames allowed to perform privileged edits.
pub struct AdminList {
    path: PathBuf,
    admins: HashSet<String>,
}

impl AdminList {
    /// Load the list from `path`. A missing file yields an empty list.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let admins = load_set(&path);
        Self { path, admins }
    }

    /// List that never touches disk.
    pub fn in_memory(admins: impl IntoIterator<Item = String>) -> Self {
        Self {
            path: PathBuf::new(),
            admins: admins.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, username: &str) -> bool {
        self.admins.contains(username)
    }

    pub fn add(&mut self, username: &str) -> bool {
        self.admins.insert(username.to_string())
    }

    pub fn remove(&mut self, username: &str) -> bool {
        self.admins.remove(username)
    }

    pub fn len(&self) -> usize {
        self.admins.len()
    }

    /// Save the list to disk.
    pub fn save(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        save_set(&self.path, &self.admins);
    }
}

/// Load a HashSet<String> from a JSON array file.
fn load_set(path: &Path) -> HashSet<String> {
    if !path.exists() {
        return HashSet::new();
    }
    let path_str = path.display();
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(vec) => {
                info!("Loaded {} entries from {path_str}", vec.len());
                vec.into_iter().collect()
            }
            Err(e) => {
                warn!("Failed to parse {path_str}: {e}");
                HashSet::new()
            }
        },
        Err(e) => {
            warn!("Failed to read {path_str}: {e}");
            HashSet::new()
        }
    }
}

/// Save a HashSet<String> as a sorted JSON array.
fn save_set(path: &Path, set: &HashSet<String>) {
    let mut sorted: Vec<&String> = set.iter().collect();
    sorted.sort();
    let path_str = path.display();
    match serde_json::to_string_pretty(&sorted) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!("Failed to write {path_str}: {e}");
            }
        }
        Err(e) => warn!("Failed to serialize {path_str}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn temp_file() -> (PathBuf, PathBuf) {
        let dir = env::temp_dir().join(format!("webcraft_admins_{}", rand::random::<u64>()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("admins.json");
        (dir, file)
    }

    #[test]
    fn missing_file_is_empty() {
        let (dir, file) = temp_file();
        let admins = AdminList::load(&file);
        assert_eq!(admins.len(), 0);
        assert!(!admins.is_admin("Steve"));
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn save_and_reload() {
        let (dir, file) = temp_file();
        let mut admins = AdminList::load(&file);
        admins.add("Steve");
        admins.add("Alex");
        admins.save();

        let reloaded = AdminList::load(&file);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_admin("Steve"));
        assert!(reloaded.is_admin("Alex"));
        let raw = fs::read_to_string(&file).unwrap();
        assert!(raw.find("Alex").unwrap() < raw.find("Steve").unwrap());
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_file_is_empty() {
        let (dir, file) = temp_file();
        fs::write(&file, "{not json").unwrap();
        assert_eq!(AdminList::load(&file).len(), 0);
        fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn remove_admin() {
        let mut admins = AdminList::in_memory(["root".to_string()]);
        assert!(admins.is_admin("root"));
        assert!(admins.remove("root"));
        assert!(!admins.is_admin("root"));
        admins.save();
    }
}
