use crate::{ConfigError, SshProfile};
use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const CONNECTIONS_FILE: &str = "connections.json";
const SETTINGS_FILE: &str = "settings.json";

/// Durable store for SSH profiles plus a small settings bag.
///
/// Owns the in-memory collection and is the sole writer of the on-disk
/// JSON snapshots. Profiles keep insertion order; names are unique.
pub struct ProfileStore {
    connections_path: PathBuf,
    settings_path: PathBuf,
    profiles: Vec<SshProfile>,
    settings: BTreeMap<String, Value>,
}

impl ProfileStore {
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::file_op(
                PathBuf::from("~"),
                std::io::Error::other("could not determine home directory"),
            )
        })?;

        Self::from_dir(&home.join(".sshdeck"))
    }

    /// Opens (or initializes) a store rooted at an explicit directory.
    pub fn from_dir(dir: &Path) -> Result<Self, ConfigError> {
        fs::create_dir_all(dir).map_err(|e| ConfigError::file_op(dir, e))?;

        let connections_path = dir.join(CONNECTIONS_FILE);
        let settings_path = dir.join(SETTINGS_FILE);

        let profiles = load_json(&connections_path, Vec::new)?;
        let settings = load_json(&settings_path, BTreeMap::new)?;
        log::info!(
            "Loaded {} profiles from {:?}",
            profiles.len(),
            connections_path
        );

        Ok(Self {
            connections_path,
            settings_path,
            profiles,
            settings,
        })
    }

    /// Adds a profile after validating it and checking name uniqueness.
    pub fn add(&mut self, mut profile: SshProfile) -> Result<(), ConfigError> {
        profile.validate()?;

        if self.find_by_name(&profile.name).is_some() {
            return Err(ConfigError::DuplicateName(profile.name));
        }

        self.profiles.push(profile);
        self.save_profiles()
    }

    /// Replaces the stored profile with the same id.
    ///
    /// `id` and `created_at` of the stored record are preserved; the
    /// name-uniqueness invariant is re-checked against all other
    /// profiles. On any failure the store is left unchanged.
    pub fn update(&mut self, mut profile: SshProfile) -> Result<(), ConfigError> {
        profile.validate()?;

        let idx = self
            .profiles
            .iter()
            .position(|p| p.id == profile.id)
            .ok_or_else(|| ConfigError::NotFound(profile.id.to_string()))?;

        let clash = self
            .profiles
            .iter()
            .any(|p| p.id != profile.id && p.name == profile.name);
        if clash {
            return Err(ConfigError::DuplicateName(profile.name));
        }

        profile.created_at = self.profiles[idx].created_at;
        self.profiles[idx] = profile;
        self.save_profiles()
    }

    /// Removes a profile by name or by 1-based position in `list_all()`
    /// order. Returns the removed profile.
    pub fn remove(&mut self, reference: &str) -> Result<SshProfile, ConfigError> {
        let idx = self.resolve(reference)?;
        let removed = self.profiles.remove(idx);
        self.save_profiles()?;
        Ok(removed)
    }

    /// Resolves a name or 1-based index to a position, without mutating.
    pub fn resolve(&self, reference: &str) -> Result<usize, ConfigError> {
        if let Ok(position) = reference.parse::<usize>() {
            if position >= 1 && position <= self.profiles.len() {
                return Ok(position - 1);
            }
            return Err(ConfigError::NotFound(reference.to_string()));
        }

        self.profiles
            .iter()
            .position(|p| p.name == reference)
            .ok_or_else(|| ConfigError::NotFound(reference.to_string()))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&SshProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&SshProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    /// Returns an insertion-ordered snapshot of all profiles.
    pub fn list_all(&self) -> Vec<SshProfile> {
        self.profiles.clone()
    }

    pub fn profiles(&self) -> &[SshProfile] {
        &self.profiles
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Marks a profile as used and persists the new usage stats.
    pub fn record_use(&mut self, id: Uuid) -> Result<(), ConfigError> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ConfigError::NotFound(id.to_string()))?;

        profile.record_use();
        self.save_profiles()
    }

    pub fn get_setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn set_setting(&mut self, key: impl Into<String>, value: Value) -> Result<(), ConfigError> {
        self.settings.insert(key.into(), value);
        self.save_settings()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.get_setting("initialized"), Some(Value::Bool(true)))
    }

    pub fn mark_initialized(&mut self) -> Result<(), ConfigError> {
        self.set_setting("initialized", Value::Bool(true))?;
        self.set_setting(
            "initialized_at",
            Value::String(Utc::now().to_rfc3339()),
        )
    }

    fn save_profiles(&self) -> Result<(), ConfigError> {
        write_json(&self.connections_path, &self.profiles)
    }

    fn save_settings(&self) -> Result<(), ConfigError> {
        write_json(&self.settings_path, &self.settings)
    }
}

/// Loads a JSON file, treating an absent file as the default value and a
/// present-but-unparseable file as corruption rather than data loss.
fn load_json<T, F>(path: &Path, default: F) -> Result<T, ConfigError>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce() -> T,
{
    if !path.exists() {
        return Ok(default());
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::file_op(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::CorruptState(format!("{}: {}", path.display(), e)))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| ConfigError::CorruptState(e.to_string()))?;

    fs::write(path, content).map_err(|e| ConfigError::file_op(path, e))
}
