use crate::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Which SSH forwarding directive a forward expression belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardKind {
    Local,
    Remote,
}

impl ForwardKind {
    pub fn directive(&self) -> &'static str {
        match self {
            ForwardKind::Local => "LocalForward",
            ForwardKind::Remote => "RemoteForward",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            ForwardKind::Local => "local_forward",
            ForwardKind::Remote => "remote_forward",
        }
    }
}

/// Saved SSH connection profile.
///
/// Persisted to disk as JSON. The `name` doubles as the `Host` alias in
/// the generated SSH config, so it must be a single clean token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshProfile {
    /// Unique identifier, generated at creation and never reassigned.
    pub id: Uuid,

    /// Display name, unique across the store.
    pub name: String,

    /// Hostname or IP address of the target.
    pub host: String,

    /// Override for the HostName directive when it differs from `host`.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Login user.
    pub user: String,

    /// SSH port, 1..=65535.
    pub port: u16,

    /// Path to the private key file, if any.
    #[serde(default)]
    pub identity_file: Option<String>,

    /// ProxyJump chain expression, e.g. "bastion" or "a@j1,b@j2".
    #[serde(default)]
    pub proxy_jump: Option<String>,

    /// LocalForward expression(s), comma-separated, stored canonically.
    #[serde(default)]
    pub local_forward: Option<String>,

    /// RemoteForward expression(s), comma-separated, stored canonically.
    #[serde(default)]
    pub remote_forward: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Additional directive name -> value pairs, emitted in sorted order.
    #[serde(default)]
    pub extra_options: BTreeMap<String, String>,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,

    #[serde(default)]
    pub use_count: u64,
}

impl SshProfile {
    pub fn new(name: impl Into<String>, host: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            host: host.into(),
            hostname: None,
            user: user.into(),
            port: 22,
            identity_file: None,
            proxy_jump: None,
            local_forward: None,
            remote_forward: None,
            notes: None,
            tags: Vec::new(),
            extra_options: BTreeMap::new(),
            created_at: Utc::now(),
            last_used: None,
            use_count: 0,
        }
    }

    /// Checks every structural invariant, canonicalizing in place where
    /// the model defines a canonical form: forward expressions are
    /// rewritten to the space-separated SSH syntax and empty optional
    /// strings are coerced to `None`. Idempotent; called by the store
    /// before every commit.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::validation("name", "must not be empty"));
        }
        if self.name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ConfigError::validation(
                "name",
                "must not contain whitespace or control characters",
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("host", "must not be empty"));
        }
        if self.user.trim().is_empty() {
            return Err(ConfigError::validation("user", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation(
                "port",
                "must be between 1 and 65535",
            ));
        }

        coerce_empty(&mut self.hostname);
        coerce_empty(&mut self.identity_file);
        coerce_empty(&mut self.proxy_jump);
        coerce_empty(&mut self.notes);

        if let Some(value) = self.local_forward.take() {
            self.local_forward = normalize_optional_forward(&value, ForwardKind::Local)?;
        }
        if let Some(value) = self.remote_forward.take() {
            self.remote_forward = normalize_optional_forward(&value, ForwardKind::Remote)?;
        }

        Ok(())
    }

    /// Updates usage statistics when the connection is used.
    pub fn record_use(&mut self) {
        self.last_used = Some(Utc::now());
        self.use_count += 1;
    }

    /// Projects this profile into an SSH config `Host` block.
    ///
    /// Pure and deterministic: directives appear in a fixed order and
    /// absent optional fields emit no line. Ends with a single newline.
    pub fn to_config_block(&self) -> String {
        let mut lines = vec![format!("Host {}", self.name)];

        if let Some(notes) = &self.notes {
            lines.push(format!("    # {}", notes));
        }

        let hostname = self.hostname.as_deref().unwrap_or(&self.host);
        lines.push(format!("    HostName {}", hostname));
        lines.push(format!("    User {}", self.user));
        lines.push(format!("    Port {}", self.port));

        if let Some(identity_file) = &self.identity_file {
            lines.push(format!("    IdentityFile {}", identity_file));
        }
        if let Some(proxy_jump) = &self.proxy_jump {
            lines.push(format!("    ProxyJump {}", proxy_jump));
        }
        if let Some(forwards) = &self.local_forward {
            for forward in split_forwards(forwards) {
                lines.push(format!("    LocalForward {}", forward));
            }
        }
        if let Some(forwards) = &self.remote_forward {
            for forward in split_forwards(forwards) {
                lines.push(format!("    RemoteForward {}", forward));
            }
        }
        for (key, value) in &self.extra_options {
            lines.push(format!("    {} {}", key, value));
        }

        let mut block = lines.join("\n");
        block.push('\n');
        block
    }
}

fn coerce_empty(field: &mut Option<String>) {
    if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
        *field = None;
    }
}

fn split_forwards(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|f| !f.is_empty())
}

fn normalize_optional_forward(
    value: &str,
    kind: ForwardKind,
) -> Result<Option<String>, ConfigError> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    normalize_forward(value, kind).map(Some)
}

/// Normalizes a port forward expression to the space-separated form the
/// SSH config syntax requires: `<local-spec> <remote-host>:<remote-port>`.
///
/// Accepted input shapes per entry (entries are comma-separated and
/// normalized independently):
/// - `3306:localhost:3306`            -> `3306 localhost:3306`
/// - `127.0.0.1:3306:localhost:3306`  -> `127.0.0.1:3306 localhost:3306`
/// - `3306 localhost:3306`            -> unchanged (already canonical)
pub fn normalize_forward(value: &str, kind: ForwardKind) -> Result<String, ConfigError> {
    let entries: Vec<&str> = split_forwards(value).collect();
    if entries.is_empty() {
        return Err(ConfigError::validation(
            kind.field(),
            format!("'{}' contains no forward entries", value),
        ));
    }

    let normalized: Vec<String> = entries
        .iter()
        .map(|entry| normalize_single_forward(entry, kind))
        .collect::<Result<_, _>>()?;

    Ok(normalized.join(","))
}

fn normalize_single_forward(entry: &str, kind: ForwardKind) -> Result<String, ConfigError> {
    let field = kind.field();

    // Already space-separated: verify the remote part and pass through.
    if let Some((local_spec, remote)) = entry.split_once(' ') {
        let remote = remote.trim();
        if local_spec.trim().is_empty() {
            return Err(ConfigError::validation(
                field,
                format!("'{}': local part must not be empty", entry),
            ));
        }
        check_remote_part(entry, remote, field)?;
        return Ok(format!("{} {}", local_spec.trim(), remote));
    }

    let segments: Vec<&str> = entry.split(':').collect();
    match segments.as_slice() {
        [local_port, remote_host, remote_port] => {
            check_numeric(entry, local_port, "local port", field)?;
            check_numeric(entry, remote_port, "remote port", field)?;
            check_non_empty(entry, remote_host, "remote host", field)?;
            Ok(format!("{} {}:{}", local_port, remote_host, remote_port))
        }
        [bind_addr, local_port, remote_host, remote_port] => {
            check_non_empty(entry, bind_addr, "bind address", field)?;
            check_numeric(entry, local_port, "local port", field)?;
            check_numeric(entry, remote_port, "remote port", field)?;
            check_non_empty(entry, remote_host, "remote host", field)?;
            Ok(format!(
                "{}:{} {}:{}",
                bind_addr, local_port, remote_host, remote_port
            ))
        }
        _ => Err(ConfigError::validation(
            field,
            format!(
                "'{}': expected 'port:host:port', 'bind:port:host:port' \
                 or 'local_spec host:port', got {} colon-separated segments",
                entry,
                segments.len()
            ),
        )),
    }
}

fn check_remote_part(entry: &str, remote: &str, field: &str) -> Result<(), ConfigError> {
    let Some((host, port)) = remote.rsplit_once(':') else {
        return Err(ConfigError::validation(
            field,
            format!("'{}': remote part must be 'host:port'", entry),
        ));
    };
    check_non_empty(entry, host, "remote host", field)?;
    check_numeric(entry, port, "remote port", field)
}

fn check_numeric(entry: &str, segment: &str, what: &str, field: &str) -> Result<(), ConfigError> {
    if segment.is_empty() || !segment.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::validation(
            field,
            format!("'{}': {} must be numeric, got '{}'", entry, what, segment),
        ));
    }
    Ok(())
}

fn check_non_empty(entry: &str, segment: &str, what: &str, field: &str) -> Result<(), ConfigError> {
    if segment.trim().is_empty() {
        return Err(ConfigError::validation(
            field,
            format!("'{}': {} must not be empty", entry, what),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> SshProfile {
        SshProfile::new("web", "web.example.com", "deploy")
    }

    #[test]
    fn test_validate_accepts_minimal_profile() {
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_name() {
        let mut p = profile();
        p.name = String::new();
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "name"
        ));

        let mut p = profile();
        p.name = "two words".into();
        assert!(p.validate().is_err());

        let mut p = profile();
        p.name = "bad\nname".into();
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut p = profile();
        p.port = 0;
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Validation { field, .. }) if field == "port"
        ));
    }

    #[test]
    fn test_validate_coerces_empty_identity_file() {
        let mut p = profile();
        p.identity_file = Some("   ".into());
        p.validate().unwrap();
        assert_eq!(p.identity_file, None);
    }

    #[test]
    fn test_validate_canonicalizes_forwards() {
        let mut p = profile();
        p.local_forward = Some("3306:localhost:3306".into());
        p.validate().unwrap();
        assert_eq!(p.local_forward.as_deref(), Some("3306 localhost:3306"));

        // Running validation again must not change anything.
        p.validate().unwrap();
        assert_eq!(p.local_forward.as_deref(), Some("3306 localhost:3306"));
    }

    #[test]
    fn test_normalize_forward_shorthand() {
        let got = normalize_forward("3306:localhost:3306", ForwardKind::Local).unwrap();
        assert_eq!(got, "3306 localhost:3306");
    }

    #[test]
    fn test_normalize_forward_with_bind_address() {
        let got = normalize_forward("127.0.0.1:3306:localhost:3306", ForwardKind::Local).unwrap();
        assert_eq!(got, "127.0.0.1:3306 localhost:3306");
    }

    #[test]
    fn test_normalize_forward_canonical_is_unchanged() {
        let got = normalize_forward("3306 localhost:3306", ForwardKind::Local).unwrap();
        assert_eq!(got, "3306 localhost:3306");
    }

    #[test]
    fn test_normalize_forward_multiple_entries() {
        let got =
            normalize_forward("8080:localhost:80,3000:localhost:3000", ForwardKind::Local).unwrap();
        assert_eq!(got, "8080 localhost:80,3000 localhost:3000");
    }

    #[test]
    fn test_normalize_forward_rejects_non_numeric_port() {
        let err = normalize_forward("abc:localhost:3306", ForwardKind::Local).unwrap_err();
        match err {
            ConfigError::Validation { field, reason } => {
                assert_eq!(field, "local_forward");
                assert!(reason.contains("local port must be numeric"), "{reason}");
                assert!(reason.contains("abc"), "{reason}");
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_forward_rejects_empty_host() {
        let err = normalize_forward("3306::3306", ForwardKind::Remote).unwrap_err();
        match err {
            ConfigError::Validation { field, reason } => {
                assert_eq!(field, "remote_forward");
                assert!(reason.contains("remote host"), "{reason}");
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_forward_rejects_wrong_segment_count() {
        assert!(normalize_forward("3306", ForwardKind::Local).is_err());
        assert!(normalize_forward("a:b:c:d:e", ForwardKind::Local).is_err());
    }

    #[test]
    fn test_normalize_forward_rejects_bad_remote_in_canonical_form() {
        assert!(normalize_forward("3306 localhost", ForwardKind::Local).is_err());
        assert!(normalize_forward("3306 localhost:abc", ForwardKind::Local).is_err());
    }

    #[test]
    fn test_config_block_minimal() {
        let p = profile();
        assert_eq!(
            p.to_config_block(),
            "Host web\n    HostName web.example.com\n    User deploy\n    Port 22\n"
        );
    }

    #[test]
    fn test_config_block_full_directive_order() {
        let mut p = SshProfile::new("db", "db.example.com", "admin");
        p.port = 5432;
        p.hostname = Some("db.internal".into());
        p.identity_file = Some("/home/me/.ssh/id_ed25519".into());
        p.proxy_jump = Some("bastion".into());
        p.local_forward = Some("5432:localhost:5432".into());
        p.remote_forward = Some("9000:localhost:9000".into());
        p.notes = Some("production replica".into());
        p.extra_options
            .insert("ServerAliveInterval".into(), "60".into());
        p.extra_options.insert("Compression".into(), "yes".into());
        p.validate().unwrap();

        let block = p.to_config_block();
        let expected = "\
Host db
    # production replica
    HostName db.internal
    User admin
    Port 5432
    IdentityFile /home/me/.ssh/id_ed25519
    ProxyJump bastion
    LocalForward 5432 localhost:5432
    RemoteForward 9000 localhost:9000
    Compression yes
    ServerAliveInterval 60
";
        assert_eq!(block, expected);
    }

    #[test]
    fn test_config_block_is_idempotent() {
        let mut p = profile();
        p.local_forward = Some("8080:localhost:80".into());
        p.validate().unwrap();
        assert_eq!(p.to_config_block(), p.to_config_block());
    }

    #[test]
    fn test_config_block_multiple_forwards_emit_one_line_each() {
        let mut p = profile();
        p.local_forward = Some("8080:localhost:80,3000:localhost:3000".into());
        p.validate().unwrap();

        let block = p.to_config_block();
        assert!(block.contains("    LocalForward 8080 localhost:80\n"));
        assert!(block.contains("    LocalForward 3000 localhost:3000\n"));
    }

    #[test]
    fn test_record_use() {
        let mut p = profile();
        assert_eq!(p.use_count, 0);
        assert!(p.last_used.is_none());

        p.record_use();
        assert_eq!(p.use_count, 1);
        assert!(p.last_used.is_some());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut p = profile();
        p.tags = vec!["prod".into(), "web".into()];
        p.validate().unwrap();

        let json = serde_json::to_string(&p).unwrap();
        let back: SshProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, p.id);
        assert_eq!(back.name, p.name);
        assert_eq!(back.created_at, p.created_at);
        assert_eq!(back.tags, p.tags);
    }
}
