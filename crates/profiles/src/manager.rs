//! Profile lifecycle management.

use crate::registry::{Profile, ProfilesIndex};
use crate::scope::scope_config;
use chrono::Utc;
use regpack_common::{Error, NodeMode, Result, SharedConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const PROFILES_DIR: &str = "profiles";
const INDEX_FILE: &str = "profiles.json";
const CONFIG_FILE: &str = "config.json";

/// Outcome of [`ProfileManager::init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    /// Layout is current; registry is ready.
    Ready,
    /// A legacy layout was found and wiped with consent.
    LegacyWiped,
    /// A legacy layout was found and the user declined the wipe. Nothing
    /// was touched; the caller must abort.
    Aborted,
}

/// Owns the profile registry and every profile directory under one base.
pub struct ProfileManager {
    base_dir: PathBuf,
}

impl ProfileManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE)
    }

    fn profiles_root(&self) -> PathBuf {
        self.base_dir.join(PROFILES_DIR)
    }

    /// Initialize the base directory, migrating away from legacy layouts.
    ///
    /// Two legacy markers are detected: shared top-level data directories
    /// sitting outside any profile, and profile records stored as flat JSON
    /// files instead of directory trees. Either one triggers the consent
    /// gate before anything is deleted; declining leaves every file
    /// untouched and returns [`InitOutcome::Aborted`].
    pub fn init<F>(&self, consent: F) -> Result<InitOutcome>
    where
        F: FnOnce(&[String]) -> bool,
    {
        let findings = self.detect_legacy_layout()?;

        if !findings.is_empty() {
            warn!("Legacy data layout detected: {} finding(s)", findings.len());
            if !consent(&findings) {
                info!("Legacy wipe declined; aborting initialization");
                return Ok(InitOutcome::Aborted);
            }
            fs::remove_dir_all(&self.base_dir)?;
            fs::create_dir_all(self.profiles_root())?;
            ProfilesIndex::default().save(&self.index_path())?;
            info!("Legacy layout wiped, fresh registry created");
            return Ok(InitOutcome::LegacyWiped);
        }

        fs::create_dir_all(self.profiles_root())?;
        if !self.index_path().exists() {
            ProfilesIndex::default().save(&self.index_path())?;
        }
        Ok(InitOutcome::Ready)
    }

    fn detect_legacy_layout(&self) -> Result<Vec<String>> {
        let mut findings = Vec::new();
        if !self.base_dir.exists() {
            return Ok(findings);
        }

        // Marker 1: shared data directories at the top level, outside any
        // profile subtree.
        for legacy in ["wallets", "keys", "snapshots", "scenarios"] {
            let path = self.base_dir.join(legacy);
            if path.is_dir() {
                findings.push(format!(
                    "shared top-level data directory {:?} (pre-profile layout)",
                    path
                ));
            }
        }

        // Marker 2: profiles stored as flat JSON files rather than
        // directory trees.
        let root = self.profiles_root();
        if root.is_dir() {
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                    findings.push(format!("flat profile record {:?}", path));
                }
            }
        }

        Ok(findings)
    }

    /// Create a new profile with an exclusive directory tree.
    ///
    /// The external-mode singleton invariant is checked before any
    /// directory is created: validate, then act.
    pub fn create(&self, name: &str, mode: NodeMode, config: &SharedConfig) -> Result<Profile> {
        let mut index = ProfilesIndex::load(&self.index_path())?;

        if mode == NodeMode::External
            && index.profiles.iter().any(|p| p.mode == NodeMode::External)
        {
            return Err(Error::Config(
                "an external-process profile already exists; external nodes share one \
                 process and cannot be isolated, so only one such profile is allowed"
                    .to_string(),
            ));
        }
        if index.profiles.iter().any(|p| p.name == name) {
            return Err(Error::Config(format!("profile {:?} already exists", name)));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let directory = self.profiles_root().join(&id);

        for sub in ["wallets", "keys", "snapshots", "scenarios", "logs"] {
            fs::create_dir_all(directory.join(sub))?;
        }
        if mode == NodeMode::Container {
            fs::create_dir_all(directory.join("docker-data").join("bitcoin-data"))?;
            fs::create_dir_all(directory.join("docker-data").join("nginx"))?;
        }

        let mut scoped = scope_config(config, &directory);
        scoped.mode = mode;
        let config_path = directory.join(CONFIG_FILE);
        scoped.save(&config_path)?;

        let now = Utc::now();
        let profile = Profile {
            id,
            name: name.to_string(),
            mode,
            created_at: now,
            last_used_at: now,
            config_path,
            directory,
        };
        index.profiles.push(profile.clone());
        index.save(&self.index_path())?;

        info!("Created {} profile {:?} ({})", mode, name, profile.id);
        Ok(profile)
    }

    /// Activate a profile by id or name, bumping its last-used time.
    pub fn activate(&self, id_or_name: &str) -> Result<Profile> {
        let mut index = ProfilesIndex::load(&self.index_path())?;
        let profile = index
            .find_mut(id_or_name)
            .ok_or_else(|| Error::Config(format!("no such profile: {}", id_or_name)))?;

        profile.last_used_at = Utc::now();
        let activated = profile.clone();
        index.active_profile_id = Some(activated.id.clone());
        index.save(&self.index_path())?;
        Ok(activated)
    }

    pub fn rename(&self, id_or_name: &str, new_name: &str) -> Result<()> {
        let mut index = ProfilesIndex::load(&self.index_path())?;
        if index.profiles.iter().any(|p| p.name == new_name) {
            return Err(Error::Config(format!(
                "profile {:?} already exists",
                new_name
            )));
        }
        let profile = index
            .find_mut(id_or_name)
            .ok_or_else(|| Error::Config(format!("no such profile: {}", id_or_name)))?;
        profile.name = new_name.to_string();
        index.save(&self.index_path())
    }

    /// Delete a profile: directory subtree plus registry entry. Clears the
    /// active pointer when it pointed at the deleted profile.
    pub fn delete(&self, id_or_name: &str) -> Result<()> {
        let mut index = ProfilesIndex::load(&self.index_path())?;
        let profile = index
            .find(id_or_name)
            .ok_or_else(|| Error::Config(format!("no such profile: {}", id_or_name)))?
            .clone();

        if profile.directory.exists() {
            fs::remove_dir_all(&profile.directory)?;
        }
        index.profiles.retain(|p| p.id != profile.id);
        if index.active_profile_id.as_deref() == Some(profile.id.as_str()) {
            index.active_profile_id = None;
        }
        index.save(&self.index_path())?;
        info!("Deleted profile {:?} ({})", profile.name, profile.id);
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Profile>> {
        Ok(ProfilesIndex::load(&self.index_path())?.profiles)
    }

    /// The currently active profile, if any.
    pub fn active(&self) -> Result<Option<Profile>> {
        Ok(ProfilesIndex::load(&self.index_path())?.active().cloned())
    }
}
