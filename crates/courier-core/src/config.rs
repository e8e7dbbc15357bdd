use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Persisted registry: projects, per-channel bindings, and the allow-list.
///
/// The on-disk shape is `config.json` with camelCase keys; every section is
/// optional so a partial or empty file loads cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConfigFile {
    #[serde(default)]
    pub projects: BTreeMap<String, ProjectConfig>,

    #[serde(default, rename = "channelMap")]
    pub channel_map: BTreeMap<String, String>,

    #[serde(default, rename = "allowedUsers")]
    pub allowed_users: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project name is empty")]
    ProjectNameEmpty,
    #[error("project path is empty")]
    ProjectPathEmpty,
    #[error("project not found: {name}")]
    ProjectNotFound { name: String },
}

/// Lowercase and drop everything outside `[a-z0-9_-]`.
pub fn normalize_project_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

impl ConfigFile {
    pub fn project(&self, name: &str) -> Option<&ProjectConfig> {
        self.projects.get(name)
    }

    pub fn project_for_channel(&self, channel: &str) -> Option<&str> {
        self.channel_map.get(channel).map(String::as_str)
    }

    /// Empty allow-list means unrestricted.
    pub fn is_allowed(&self, user: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user)
    }

    /// Add (or overwrite) a project under its normalized name.
    pub fn add_project(
        &self,
        name: &str,
        path: &str,
        description: Option<&str>,
    ) -> Result<(Self, String), ConfigError> {
        let name = normalize_project_name(name);
        if name.is_empty() {
            return Err(ConfigError::ProjectNameEmpty);
        }
        if path.trim().is_empty() {
            return Err(ConfigError::ProjectPathEmpty);
        }

        let mut next = self.clone();
        next.projects.insert(
            name.clone(),
            ProjectConfig {
                path: path.to_owned(),
                description: description
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                    .map(str::to_owned),
            },
        );
        Ok((next, name))
    }

    /// Remove a project and unbind every channel mapped to it.
    pub fn remove_project(&self, name: &str) -> Result<Self, ConfigError> {
        if !self.projects.contains_key(name) {
            return Err(ConfigError::ProjectNotFound {
                name: name.to_owned(),
            });
        }

        let mut next = self.clone();
        next.projects.remove(name);
        next.channel_map.retain(|_, bound| bound != name);
        Ok(next)
    }

    pub fn bind_channel(&self, channel: &str, name: &str) -> Result<Self, ConfigError> {
        if !self.projects.contains_key(name) {
            return Err(ConfigError::ProjectNotFound {
                name: name.to_owned(),
            });
        }

        let mut next = self.clone();
        next.channel_map
            .insert(channel.to_owned(), name.to_owned());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_project(name: &str) -> ConfigFile {
        ConfigFile::default()
            .add_project(name, "/tmp/demo", Some("demo project"))
            .unwrap()
            .0
    }

    #[test]
    fn normalize_strips_invalid_chars() {
        assert_eq!(normalize_project_name("My App!"), "myapp");
        assert_eq!(normalize_project_name("web_ui-2"), "web_ui-2");
        assert_eq!(normalize_project_name("///"), "");
    }

    #[test]
    fn add_rejects_empty_name_and_path() {
        let cfg = ConfigFile::default();
        assert!(matches!(
            cfg.add_project("!!!", "/tmp/x", None),
            Err(ConfigError::ProjectNameEmpty)
        ));
        assert!(matches!(
            cfg.add_project("ok", "  ", None),
            Err(ConfigError::ProjectPathEmpty)
        ));
    }

    #[test]
    fn add_overwrites_existing_entry() {
        let cfg = with_project("demo");
        let (cfg, _) = cfg.add_project("demo", "/elsewhere", None).unwrap();
        assert_eq!(cfg.project("demo").unwrap().path, "/elsewhere");
        assert_eq!(cfg.projects.len(), 1);
    }

    #[test]
    fn remove_unbinds_channels() {
        let cfg = with_project("demo");
        let cfg = cfg.bind_channel("1001", "demo").unwrap();
        let cfg = cfg.bind_channel("1002", "demo").unwrap();

        let cfg = cfg.remove_project("demo").unwrap();
        assert!(cfg.project("demo").is_none());
        assert!(cfg.channel_map.is_empty());
    }

    #[test]
    fn remove_unknown_project_errors() {
        let err = ConfigFile::default().remove_project("ghost").unwrap_err();
        assert!(matches!(err, ConfigError::ProjectNotFound { .. }));
    }

    #[test]
    fn bind_requires_existing_project() {
        let err = ConfigFile::default()
            .bind_channel("1001", "ghost")
            .unwrap_err();
        assert!(matches!(err, ConfigError::ProjectNotFound { .. }));

        let cfg = with_project("demo").bind_channel("1001", "demo").unwrap();
        assert_eq!(cfg.project_for_channel("1001"), Some("demo"));
    }

    #[test]
    fn empty_allow_list_allows_everyone() {
        let cfg = ConfigFile::default();
        assert!(cfg.is_allowed("anyone"));

        let cfg = ConfigFile {
            allowed_users: vec!["u1".to_owned()],
            ..Default::default()
        };
        assert!(cfg.is_allowed("u1"));
        assert!(!cfg.is_allowed("u2"));
    }

    #[test]
    fn disk_shape_uses_camel_case_keys() {
        let cfg = with_project("demo").bind_channel("1001", "demo").unwrap();
        let json = serde_json::to_value(&cfg).unwrap();
        assert!(json.get("channelMap").is_some());
        assert!(json.get("allowedUsers").is_some());

        let parsed: ConfigFile = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, ConfigFile::default());
    }
}
