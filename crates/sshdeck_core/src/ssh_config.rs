use crate::{ConfigError, SshProfile};
use std::fs;
use std::path::{Path, PathBuf};

const MANAGED_FILE: &str = "config.sshdeck";
const BACKUP_FILE: &str = "config.backup";

/// Classification of the sentinel `Include` line in the primary file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeState {
    /// Exactly one well-formed sentinel line is present.
    Installed,
    /// No line references the managed file.
    Missing,
    /// The sentinel is duplicated or present in a malformed variant.
    Corrupted,
}

/// Keeps the managed SSH config file in sync with the profile store and
/// maintains exactly one `Include` line in the user's own config.
///
/// The managed file is engine-owned and rewritten wholesale; the primary
/// file is only ever touched to add or repair the single sentinel line,
/// with a copy-before-write backup kept in a single slot.
pub struct SshConfigIntegration {
    primary: PathBuf,
    managed: PathBuf,
    backup: PathBuf,
}

impl SshConfigIntegration {
    pub fn new() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or_else(|| {
            ConfigError::file_op(
                PathBuf::from("~"),
                std::io::Error::other("could not determine home directory"),
            )
        })?;

        let ssh_dir = home.join(".ssh");
        fs::create_dir_all(&ssh_dir).map_err(|e| ConfigError::file_op(&ssh_dir, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o700);
            fs::set_permissions(&ssh_dir, perms).map_err(|e| ConfigError::file_op(&ssh_dir, e))?;
        }

        Ok(Self::with_dir(&ssh_dir))
    }

    /// Builds an integration rooted at an explicit SSH directory.
    pub fn with_dir(ssh_dir: &Path) -> Self {
        Self {
            primary: ssh_dir.join("config"),
            managed: ssh_dir.join(MANAGED_FILE),
            backup: ssh_dir.join(BACKUP_FILE),
        }
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn managed_path(&self) -> &Path {
        &self.managed
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// The exact line the primary file must contain.
    pub fn sentinel(&self) -> String {
        format!("Include {}", self.managed.display())
    }

    /// Rewrites the managed file from the given profiles, wholesale.
    pub fn regenerate(&self, profiles: &[SshProfile]) -> Result<(), ConfigError> {
        let mut content = String::from(
            "# Managed by sshdeck - do not edit by hand.\n\
             # Profile changes made through sshdeck rewrite this file.\n\n",
        );

        for profile in profiles {
            content.push_str(&profile.to_config_block());
            content.push('\n');
        }

        fs::write(&self.managed, content).map_err(|e| ConfigError::file_op(&self.managed, e))?;
        log::info!("Regenerated {:?} with {} profiles", self.managed, profiles.len());
        Ok(())
    }

    /// Classifies the primary file's sentinel without mutating anything.
    pub fn include_state(&self) -> Result<IncludeState, ConfigError> {
        let content = self.read_primary()?;
        Ok(self.classify(&content))
    }

    /// Makes sure the primary file includes the managed file, exactly
    /// once. Idempotent: a second call finds the sentinel installed and
    /// leaves the file byte-identical. A corrupted sentinel is reported,
    /// never silently repaired here; run `fix_config` for that.
    pub fn ensure_included(&self) -> Result<(), ConfigError> {
        let content = self.read_primary()?;

        match self.classify(&content) {
            IncludeState::Installed => Ok(()),
            IncludeState::Corrupted => Err(ConfigError::CorruptState(format!(
                "{} contains a duplicated or malformed include of {}; run fix-config",
                self.primary.display(),
                MANAGED_FILE
            ))),
            IncludeState::Missing => {
                self.write_backup(&content)?;

                let mut updated = content;
                if !updated.is_empty() && !updated.ends_with('\n') {
                    updated.push('\n');
                }
                updated.push_str(&self.sentinel());
                updated.push('\n');

                fs::write(&self.primary, updated)
                    .map_err(|e| ConfigError::file_op(&self.primary, e))?;
                log::info!("Added include line to {:?}", self.primary);
                Ok(())
            }
        }
    }

    /// Removes every line referencing the managed file, collapses the
    /// blank-line runs left behind, and installs one correct sentinel.
    /// The pre-fix content goes to the backup slot first.
    pub fn fix_config(&self) -> Result<(), ConfigError> {
        let content = self.read_primary()?;
        self.write_backup(&content)?;

        let mut lines: Vec<&str> = Vec::new();
        let mut previous_blank = false;
        for line in content.lines() {
            if references_managed(line) {
                continue;
            }
            let blank = line.trim().is_empty();
            if blank && previous_blank {
                continue;
            }
            previous_blank = blank;
            lines.push(line);
        }

        let mut cleaned = lines.join("\n");
        cleaned = cleaned.trim_end().to_string();
        if !cleaned.is_empty() {
            cleaned.push('\n');
        }
        cleaned.push_str(&self.sentinel());
        cleaned.push('\n');

        fs::write(&self.primary, cleaned).map_err(|e| ConfigError::file_op(&self.primary, e))?;
        log::info!("Repaired include line in {:?}", self.primary);
        Ok(())
    }

    /// Restores the primary file from the backup slot and deletes the
    /// managed file, returning the system to its pre-integration state.
    pub fn reset(&self) -> Result<(), ConfigError> {
        if !self.backup.exists() {
            return Err(ConfigError::BackupNotFound);
        }

        fs::copy(&self.backup, &self.primary)
            .map_err(|e| ConfigError::file_op(&self.primary, e))?;

        if self.managed.exists() {
            fs::remove_file(&self.managed).map_err(|e| ConfigError::file_op(&self.managed, e))?;
        }

        log::info!("Restored {:?} from {:?}", self.primary, self.backup);
        Ok(())
    }

    /// Reads the primary file, creating an empty one if it is absent.
    fn read_primary(&self) -> Result<String, ConfigError> {
        match fs::read_to_string(&self.primary) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                fs::write(&self.primary, "")
                    .map_err(|e| ConfigError::file_op(&self.primary, e))?;
                Ok(String::new())
            }
            Err(e) => Err(ConfigError::file_op(&self.primary, e)),
        }
    }

    fn write_backup(&self, content: &str) -> Result<(), ConfigError> {
        fs::write(&self.backup, content).map_err(|e| ConfigError::file_op(&self.backup, e))
    }

    fn classify(&self, content: &str) -> IncludeState {
        let sentinel = self.sentinel();
        let mut exact = 0usize;
        let mut referencing = 0usize;

        for line in content.lines() {
            if references_managed(line) {
                referencing += 1;
                if line.trim() == sentinel {
                    exact += 1;
                }
            }
        }

        if referencing == 0 {
            IncludeState::Missing
        } else if referencing == 1 && exact == 1 {
            IncludeState::Installed
        } else {
            IncludeState::Corrupted
        }
    }
}

/// A line counts as a (possibly broken) sentinel when it mentions both
/// the Include directive and the managed file's basename.
fn references_managed(line: &str) -> bool {
    line.contains("Include") && line.contains(MANAGED_FILE)
}
