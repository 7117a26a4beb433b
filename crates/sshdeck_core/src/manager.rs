use crate::key_discovery::discover_keys;
use crate::{ConfigError, ProfileStore, SshConfigIntegration, SshProfile};
use serde_json::Value;
use std::path::{Path, PathBuf};

const DEFAULT_IDENTITY_SETTING: &str = "default_identity_file";

/// Façade tying the profile store and the SSH config integration
/// together. This is the only surface the CLI talks to: it persists
/// profile changes and keeps the generated config in sync, and hands
/// plain data and `ConfigError` values back for presentation.
pub struct ConnectionManager {
    store: ProfileStore,
    integration: SshConfigIntegration,
    ssh_dir: PathBuf,
}

impl ConnectionManager {
    pub fn new() -> Result<Self, ConfigError> {
        let store = ProfileStore::new()?;
        let integration = SshConfigIntegration::new()?;
        let ssh_dir = integration
            .primary_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            store,
            integration,
            ssh_dir,
        })
    }

    /// Builds a manager over explicit directories.
    pub fn with_dirs(config_dir: &Path, ssh_dir: &Path) -> Result<Self, ConfigError> {
        std::fs::create_dir_all(ssh_dir).map_err(|e| ConfigError::file_op(ssh_dir, e))?;

        Ok(Self {
            store: ProfileStore::from_dir(config_dir)?,
            integration: SshConfigIntegration::with_dir(ssh_dir),
            ssh_dir: ssh_dir.to_path_buf(),
        })
    }

    pub fn add_connection(&mut self, profile: SshProfile) -> Result<(), ConfigError> {
        self.store.add(profile)?;
        self.refresh()
    }

    pub fn update_connection(&mut self, profile: SshProfile) -> Result<(), ConfigError> {
        self.store.update(profile)?;
        self.refresh()
    }

    /// Removes by name or 1-based listing position and resyncs the
    /// managed file. Returns the removed profile.
    pub fn remove_connection(&mut self, reference: &str) -> Result<SshProfile, ConfigError> {
        let removed = self.store.remove(reference)?;
        self.refresh()?;
        Ok(removed)
    }

    pub fn get_connection(&self, name: &str) -> Option<&SshProfile> {
        self.store.find_by_name(name)
    }

    /// Resolves a name or 1-based listing position to a profile.
    pub fn resolve_connection(&self, reference: &str) -> Result<&SshProfile, ConfigError> {
        let idx = self.store.resolve(reference)?;
        Ok(&self.store.profiles()[idx])
    }

    pub fn list_connections(&self) -> Vec<SshProfile> {
        self.store.list_all()
    }

    /// Touches usage statistics for a profile. Does not regenerate the
    /// managed file; usage is not part of the projected config.
    pub fn record_use(&mut self, name: &str) -> Result<(), ConfigError> {
        let id = self
            .store
            .find_by_name(name)
            .map(|p| p.id)
            .ok_or_else(|| ConfigError::NotFound(name.to_string()))?;
        self.store.record_use(id)
    }

    /// Regenerates the managed file and makes sure the primary config
    /// includes it.
    pub fn refresh(&self) -> Result<(), ConfigError> {
        self.integration.regenerate(self.store.profiles())?;
        self.integration.ensure_included()
    }

    pub fn fix_config(&self) -> Result<(), ConfigError> {
        self.integration.fix_config()
    }

    pub fn reset(&self) -> Result<(), ConfigError> {
        self.integration.reset()
    }

    pub fn discover_keys(&self) -> Vec<PathBuf> {
        discover_keys(&self.ssh_dir)
    }

    pub fn default_identity_file(&self) -> Option<String> {
        match self.store.get_setting(DEFAULT_IDENTITY_SETTING)? {
            Value::String(path) if !path.is_empty() => Some(path.clone()),
            _ => None,
        }
    }

    pub fn set_default_identity_file(&mut self, path: &str) -> Result<(), ConfigError> {
        self.store
            .set_setting(DEFAULT_IDENTITY_SETTING, Value::String(path.to_string()))
    }

    pub fn get_setting(&self, key: &str) -> Option<&Value> {
        self.store.get_setting(key)
    }

    pub fn set_setting(&mut self, key: &str, value: Value) -> Result<(), ConfigError> {
        self.store.set_setting(key, value)
    }

    pub fn is_initialized(&self) -> bool {
        self.store.is_initialized()
    }

    pub fn mark_initialized(&mut self) -> Result<(), ConfigError> {
        self.store.mark_initialized()
    }

    pub fn integration(&self) -> &SshConfigIntegration {
        &self.integration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    struct Dirs {
        _tmp: TempDir,
        config: PathBuf,
        ssh: PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = TempDir::new().unwrap();
        let config = tmp.path().join("sshdeck");
        let ssh = tmp.path().join("ssh");
        Dirs {
            _tmp: tmp,
            config,
            ssh,
        }
    }

    fn manager(d: &Dirs) -> ConnectionManager {
        ConnectionManager::with_dirs(&d.config, &d.ssh).unwrap()
    }

    fn profile(name: &str) -> SshProfile {
        SshProfile::new(name, format!("{name}.example.com"), "admin")
    }

    #[test]
    fn test_add_projects_profile_into_managed_file() {
        let d = dirs();
        let mut m = manager(&d);

        let mut p = SshProfile::new("db", "db.example.com", "admin");
        p.port = 5432;
        p.local_forward = Some("5432:localhost:5432".into());
        m.add_connection(p).unwrap();

        let managed = fs::read_to_string(m.integration().managed_path()).unwrap();
        assert!(managed.contains("Host db\n"));
        assert!(managed.contains("    HostName db.example.com\n"));
        assert!(managed.contains("    User admin\n"));
        assert!(managed.contains("    Port 5432\n"));
        assert!(managed.contains("    LocalForward 5432 localhost:5432\n"));

        let primary = fs::read_to_string(m.integration().primary_path()).unwrap();
        assert_eq!(primary.matches(&m.integration().sentinel()).count(), 1);
    }

    #[test]
    fn test_remove_resyncs_managed_file() {
        let d = dirs();
        let mut m = manager(&d);
        m.add_connection(profile("web")).unwrap();
        m.add_connection(profile("db")).unwrap();

        m.remove_connection("web").unwrap();

        let managed = fs::read_to_string(m.integration().managed_path()).unwrap();
        assert!(!managed.contains("Host web"));
        assert!(managed.contains("Host db"));
    }

    #[test]
    fn test_remove_by_listing_position() {
        let d = dirs();
        let mut m = manager(&d);
        m.add_connection(profile("web")).unwrap();
        m.add_connection(profile("db")).unwrap();

        let listing = m.list_connections();
        assert_eq!(listing[1].name, "db");

        let removed = m.remove_connection("2").unwrap();
        assert_eq!(removed.name, "db");
    }

    #[test]
    fn test_record_use_requires_known_name() {
        let d = dirs();
        let mut m = manager(&d);
        assert!(matches!(
            m.record_use("ghost"),
            Err(ConfigError::NotFound(_))
        ));

        m.add_connection(profile("web")).unwrap();
        m.record_use("web").unwrap();
        assert_eq!(m.get_connection("web").unwrap().use_count, 1);
    }

    #[test]
    fn test_default_identity_setting_round_trip() {
        let d = dirs();
        let mut m = manager(&d);
        assert_eq!(m.default_identity_file(), None);

        m.set_default_identity_file("/home/me/.ssh/id_ed25519").unwrap();
        assert_eq!(
            m.default_identity_file().as_deref(),
            Some("/home/me/.ssh/id_ed25519")
        );

        // Survives a fresh manager over the same directories.
        let m2 = manager(&d);
        assert_eq!(
            m2.default_identity_file().as_deref(),
            Some("/home/me/.ssh/id_ed25519")
        );
    }

    #[test]
    fn test_initialization_flow() {
        let d = dirs();
        let mut m = manager(&d);
        assert!(!m.is_initialized());

        m.mark_initialized().unwrap();
        assert!(m.is_initialized());
        assert!(m.get_setting("initialized_at").is_some());
    }

    #[test]
    fn test_discover_keys_reads_ssh_dir() {
        let d = dirs();
        let m = manager(&d);
        fs::write(d.ssh.join("id_ed25519"), "key material").unwrap();

        assert_eq!(m.discover_keys(), vec![d.ssh.join("id_ed25519")]);
    }

    #[test]
    fn test_duplicate_add_leaves_managed_file_with_one_block() {
        let d = dirs();
        let mut m = manager(&d);
        m.add_connection(profile("web")).unwrap();
        assert!(m.add_connection(profile("web")).is_err());

        let managed = fs::read_to_string(m.integration().managed_path()).unwrap();
        assert_eq!(managed.matches("Host web").count(), 1);
    }
}
