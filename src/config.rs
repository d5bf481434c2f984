use crate::error::{PortalError, Result};
use crate::github::purpose::{AppPurpose, CustomAppPurpose, PurposeRegistry};
use crate::settings::OrganizationSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON file of organization settings layered over `organizations`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_settings_file: Option<PathBuf>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub apps: Vec<AppConfiguration>,
    #[serde(default)]
    pub purposes: Vec<CustomAppPurpose>,
    #[serde(default)]
    pub organizations: Vec<OrganizationSettings>,
}

/// One registered GitHub App.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfiguration {
    pub app_id: u64,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Purpose ids this app backs unless an organization overrides them.
    #[serde(default)]
    pub purposes: Vec<String>,
}

impl fmt::Debug for AppConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfiguration")
            .field("app_id", &self.app_id)
            .field("slug", &self.slug)
            .field("friendly_name", &self.friendly_name)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("private_key_file", &self.private_key_file)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("purposes", &self.purposes)
            .finish()
    }
}

impl AppConfiguration {
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.slug)
    }

    pub fn api_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
    }

    /// Environment variable that can carry this app's PEM instead of the file.
    pub fn private_key_env_var(&self) -> String {
        format!("ORGPORTAL_APP_{}_PRIVATE_KEY", self.app_id)
    }

    fn has_private_key_source(&self) -> bool {
        self.private_key.is_some()
            || self.private_key_file.is_some()
            || std::env::var_os(self.private_key_env_var()).is_some()
    }

    pub fn private_key_pem(&self) -> Result<String> {
        if let Ok(pem) = std::env::var(self.private_key_env_var()) {
            return Ok(pem);
        }
        if let Some(pem) = &self.private_key {
            return Ok(pem.clone());
        }
        if let Some(path) = &self.private_key_file {
            return fs::read_to_string(path).map_err(|e| PortalError::PrivateKey {
                app_id: self.app_id,
                message: format!("cannot read {}: {e}", path.display()),
            });
        }
        Err(PortalError::PrivateKey {
            app_id: self.app_id,
            message: "no private_key, private_key_file or environment override".into(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_max_age_seconds")]
    pub max_age_seconds: u64,
    #[serde(default = "default_shared")]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_max_age_seconds() -> u64 {
    120
}

fn default_shared() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_seconds: default_max_age_seconds(),
            shared: default_shared(),
            directory: None,
            concurrency: default_concurrency(),
        }
    }
}

impl CacheConfig {
    pub fn shared_directory(&self) -> Option<PathBuf> {
        if !self.shared {
            return None;
        }
        self.directory
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("orgportal")))
    }
}

impl Config {
    pub fn purpose_registry(&self) -> Result<PurposeRegistry> {
        PurposeRegistry::new(self.purposes.iter().cloned())
    }

    /// Default purpose → app id map. A purpose claimed by two apps is an error.
    pub fn purpose_map(&self, registry: &PurposeRegistry) -> Result<HashMap<AppPurpose, u64>> {
        let mut map = HashMap::new();
        for app in &self.apps {
            for id in &app.purposes {
                let purpose = registry.resolve(id)?;
                if let Some(existing) = map.insert(purpose.clone(), app.app_id) {
                    if existing != app.app_id {
                        return Err(PortalError::Config(format!(
                            "purpose {purpose} is claimed by apps {existing} and {}",
                            app.app_id
                        )));
                    }
                }
            }
        }
        Ok(map)
    }

    pub fn app(&self, app_id: u64) -> Option<&AppConfiguration> {
        self.apps.iter().find(|a| a.app_id == app_id)
    }

    /// Checks the configuration eagerly so a missing purpose is found at
    /// startup instead of on the first request that needs it.
    pub fn validate(&self, required: &[AppPurpose]) -> Result<()> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            if !seen.insert(app.app_id) {
                return Err(PortalError::Config(format!(
                    "app {} is configured more than once",
                    app.app_id
                )));
            }
            if !app.has_private_key_source() {
                return Err(PortalError::Config(format!(
                    "app {} ({}) has no private key source",
                    app.app_id, app.slug
                )));
            }
        }

        let registry = self.purpose_registry()?;
        let map = self.purpose_map(&registry)?;

        for org in &self.organizations {
            for (purpose_id, app_id) in &org.purpose_apps {
                registry.resolve(purpose_id)?;
                if !seen.contains(app_id) {
                    return Err(PortalError::Config(format!(
                        "organization {} maps {purpose_id} to unconfigured app {app_id}",
                        org.name
                    )));
                }
            }
            for installation in &org.installations {
                if !seen.contains(&installation.app_id) {
                    return Err(PortalError::Config(format!(
                        "organization {} lists an installation of unconfigured app {}",
                        org.name, installation.app_id
                    )));
                }
            }
        }

        for purpose in required {
            if !map.contains_key(purpose) {
                return Err(PortalError::NoConfigurationForPurpose {
                    purpose: purpose.id().to_string(),
                    organization: None,
                });
            }
        }
        Ok(())
    }
}

pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg).join("orgportal").join("config.toml");
        return Ok(path);
    }

    let home =
        dirs::home_dir().ok_or_else(|| PortalError::Config("Cannot find home directory".into()))?;
    Ok(home.join(".config").join("orgportal").join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit)?;
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

pub fn save_config(config: &Config, explicit: Option<&Path>) -> Result<PathBuf> {
    let path = config_path(explicit)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    fs::write(&path, &contents)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(&path, perms)?;
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::InstallationReference;

    fn app(app_id: u64, purposes: &[&str]) -> AppConfiguration {
        AppConfiguration {
            app_id,
            slug: format!("portal-{app_id}"),
            friendly_name: None,
            private_key: Some("pem".to_string()),
            private_key_file: None,
            webhook_secret: None,
            base_url: None,
            purposes: purposes.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn config_roundtrip() {
        let config = Config {
            apps: vec![app(1, &["Data", "CustomerFacing"]), app(2, &["Operations"])],
            organizations: vec![OrganizationSettings {
                name: "contoso".to_string(),
                active: true,
                installations: vec![InstallationReference {
                    app_id: 1,
                    installation_id: 77,
                }],
                purpose_apps: HashMap::new(),
            }],
            ..Config::default()
        };

        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(deserialized.apps.len(), 2);
        assert_eq!(deserialized.apps[0].purposes, vec!["Data", "CustomerFacing"]);
        assert_eq!(deserialized.organizations[0].installations[0].installation_id, 77);
        assert_eq!(deserialized.cache.max_age_seconds, 120);
    }

    #[test]
    fn config_deserialize_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.apps.is_empty());
        assert!(config.organizations.is_empty());
        assert_eq!(config.cache.concurrency, 4);
        assert!(config.cache.shared);
    }

    #[test]
    fn config_path_uses_xdg() {
        std::env::set_var("XDG_CONFIG_HOME", "/tmp/test_xdg");
        let path = config_path(None).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/test_xdg/orgportal/config.toml"));
        std::env::remove_var("XDG_CONFIG_HOME");
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/etc/orgportal.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/etc/orgportal.toml"));
    }

    #[test]
    fn save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            apps: vec![app(5, &["Security"])],
            ..Config::default()
        };
        save_config(&config, Some(&path)).unwrap();
        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.apps[0].app_id, 5);
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut a = app(3, &[]);
        a.webhook_secret = Some("hush".to_string());
        let rendered = format!("{a:?}");
        assert!(!rendered.contains("pem\""));
        assert!(!rendered.contains("hush"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn validate_rejects_purpose_claimed_twice() {
        let config = Config {
            apps: vec![app(1, &["Data"]), app(2, &["data"])],
            ..Config::default()
        };
        assert!(matches!(config.validate(&[]), Err(PortalError::Config(_))));
    }

    #[test]
    fn validate_reports_missing_required_purpose() {
        let config = Config {
            apps: vec![app(1, &["Data"])],
            ..Config::default()
        };
        assert!(config.validate(&[AppPurpose::Data]).is_ok());
        let err = config.validate(&[AppPurpose::Security]).unwrap_err();
        assert!(matches!(err, PortalError::NoConfigurationForPurpose { .. }));
    }

    #[test]
    fn validate_rejects_override_to_unknown_app() {
        let mut purpose_apps = HashMap::new();
        purpose_apps.insert("Operations".to_string(), 99);
        let config = Config {
            apps: vec![app(1, &["Data", "Operations"])],
            organizations: vec![OrganizationSettings {
                name: "contoso".to_string(),
                active: true,
                installations: vec![],
                purpose_apps,
            }],
            ..Config::default()
        };
        assert!(config.validate(&[]).is_err());
    }

    #[test]
    fn validate_rejects_app_without_key() {
        let mut keyless = app(4, &["Data"]);
        keyless.private_key = None;
        let config = Config {
            apps: vec![keyless],
            ..Config::default()
        };
        assert!(config.validate(&[]).is_err());
    }

    #[test]
    fn base_url_defaults_to_public_api() {
        let mut a = app(1, &[]);
        assert_eq!(a.api_base_url(), "https://api.github.com");
        a.base_url = Some("https://ghe.example.com/api/v3/".to_string());
        assert_eq!(a.api_base_url(), "https://ghe.example.com/api/v3");
    }
}
