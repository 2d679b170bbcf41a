//! Profile registry records and persistence.

use chrono::{DateTime, Utc};
use regpack_common::{NodeMode, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One isolated configuration-plus-data unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub mode: NodeMode,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    /// Scoped configuration file inside the profile directory.
    pub config_path: PathBuf,
    /// Exclusively owned directory subtree.
    pub directory: PathBuf,
}

/// The registry: a single active pointer plus all known profiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfilesIndex {
    pub active_profile_id: Option<String>,
    pub profiles: Vec<Profile>,
}

impl ProfilesIndex {
    /// Load the registry; a missing file is an empty registry.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Find by id first, then by name.
    pub fn find(&self, id_or_name: &str) -> Option<&Profile> {
        self.profiles
            .iter()
            .find(|p| p.id == id_or_name)
            .or_else(|| self.profiles.iter().find(|p| p.name == id_or_name))
    }

    pub fn find_mut(&mut self, id_or_name: &str) -> Option<&mut Profile> {
        // Id matches win over name matches.
        let pos = self
            .profiles
            .iter()
            .position(|p| p.id == id_or_name)
            .or_else(|| self.profiles.iter().position(|p| p.name == id_or_name))?;
        self.profiles.get_mut(pos)
    }

    pub fn active(&self) -> Option<&Profile> {
        let id = self.active_profile_id.as_deref()?;
        self.profiles.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(id: &str, name: &str) -> Profile {
        Profile {
            id: id.to_string(),
            name: name.to_string(),
            mode: NodeMode::Container,
            created_at: Utc::now(),
            last_used_at: Utc::now(),
            config_path: PathBuf::from("/p/config.json"),
            directory: PathBuf::from("/p"),
        }
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = ProfilesIndex::load(&dir.path().join("profiles.json")).unwrap();
        assert!(index.profiles.is_empty());
        assert!(index.active_profile_id.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        let mut index = ProfilesIndex::default();
        index.profiles.push(sample("id-1", "alice"));
        index.active_profile_id = Some("id-1".to_string());
        index.save(&path).unwrap();

        let reloaded = ProfilesIndex::load(&path).unwrap();
        assert_eq!(reloaded.profiles.len(), 1);
        assert_eq!(reloaded.active().unwrap().name, "alice");
    }

    #[test]
    fn test_find_by_id_or_name() {
        let mut index = ProfilesIndex::default();
        index.profiles.push(sample("id-1", "alice"));
        assert!(index.find("id-1").is_some());
        assert!(index.find("alice").is_some());
        assert!(index.find("bob").is_none());
    }
}
