//! API configuration loaded from TOML.
//!
//! ```toml
//! base_url = "http://localhost:8080"
//!
//! [pagination]
//! default_limit = 20
//! max_limit = 50
//!
//! [settings]
//! title = "My Forum"
//!
//! [permissions]
//! guest = ["viewForum"]
//! member = ["viewForum", "startDiscussion", "reply"]
//! ```
//!
//! A missing file yields defaults; an unreadable or malformed file is logged
//! and also yields defaults.

use forum_model::Actor;
use forum_types::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_limit() -> usize {
    20
}

fn default_max_limit() -> usize {
    50
}

/// Page sizes used when an endpoint sets none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

/// Capabilities granted to every guest and every registered member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub guest: Vec<String>,
    #[serde(default)]
    pub member: Vec<String>,
    /// Capabilities members hold on records they authored.
    #[serde(default)]
    pub member_own: Vec<String>,
    /// User ids treated as administrators.
    #[serde(default)]
    pub admins: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub pagination: PaginationConfig,
    /// Overrides for resource settings, by key.
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    #[serde(default)]
    pub permissions: PermissionsConfig,
    #[serde(skip)]
    source: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            pagination: PaginationConfig::default(),
            settings: BTreeMap::new(),
            permissions: PermissionsConfig::default(),
            source: None,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from a TOML file, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No config file found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(mut config) => {
                    info!("Loaded API config from {:?}", path);
                    config.source = Some(path.to_path_buf());
                    config
                }
                Err(e) => {
                    warn!(
                        "Failed to parse config file {:?}: {}. Falling back to defaults.",
                        path, e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read config file {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// File the config was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Builds the principal for a request: a guest when `user_id` is
    /// `None`, otherwise a member (or admin) carrying the configured grants.
    pub fn actor_for(&self, user_id: Option<RecordId>) -> Actor {
        let perms = &self.permissions;
        let Some(id) = user_id else {
            return perms
                .guest
                .iter()
                .fold(Actor::guest(), |actor, cap| actor.with_grant(cap));
        };
        let base = if perms.admins.contains(&id.get()) {
            Actor::admin(id)
        } else {
            Actor::member(id)
        };
        let actor = perms.member.iter().fold(base, |actor, cap| actor.with_grant(cap));
        perms
            .member_own
            .iter()
            .fold(actor, |actor, cap| actor.with_own_grant(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forum_model::Principal;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = ApiConfig::default();
        assert_eq!(c.pagination.default_limit, 20);
        assert_eq!(c.pagination.max_limit, 50);
        assert!(c.settings.is_empty());
    }

    #[test]
    fn parse_full_file() {
        let c = ApiConfig::from_toml_str(
            r#"
            base_url = "https://forum.example"

            [pagination]
            default_limit = 10

            [settings]
            title = "Example"
            allow_signup = false

            [permissions]
            guest = ["viewForum"]
            member = ["startDiscussion"]
            member_own = ["edit"]
            admins = [1]
            "#,
        )
        .unwrap();
        assert_eq!(c.base_url, "https://forum.example");
        assert_eq!(c.pagination.default_limit, 10);
        assert_eq!(c.pagination.max_limit, 50);
        assert_eq!(c.settings["title"], Value::from("Example"));
        assert_eq!(c.settings["allow_signup"], Value::Bool(false));
        assert_eq!(c.permissions.member_own, vec!["edit"]);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = ApiConfig::load_from(&dir.path().join("nope.toml"));
        assert_eq!(c, ApiConfig::default());
        assert!(c.source().is_none());
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"base_url = [unclosed").unwrap();
        let c = ApiConfig::load_from(&path);
        assert_eq!(c.base_url, default_base_url());
    }

    #[test]
    fn loaded_file_remembers_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api.toml");
        std::fs::write(&path, "base_url = \"http://x\"\n").unwrap();
        let c = ApiConfig::load_from(&path);
        assert_eq!(c.base_url, "http://x");
        assert_eq!(c.source(), Some(path.as_path()));
    }

    #[test]
    fn actor_grants_follow_config() {
        let c = ApiConfig::from_toml_str(
            r#"
            [permissions]
            guest = ["viewForum"]
            member = ["startDiscussion"]
            admins = [9]
            "#,
        )
        .unwrap();
        let guest = c.actor_for(None);
        assert!(guest.can("viewForum", None));
        assert!(!guest.can("startDiscussion", None));

        let member = c.actor_for(Some(RecordId::new(2)));
        assert!(member.can("startDiscussion", None));
        assert!(!member.is_admin());

        assert!(c.actor_for(Some(RecordId::new(9))).is_admin());
    }
}
