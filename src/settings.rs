//! Per-organization settings.
//!
//! Static entries come from the config file. A JSON file of dynamic entries,
//! typically exported from the portal database, is layered on top: a dynamic
//! entry replaces the static entry with the same name.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationReference {
    pub app_id: u64,
    pub installation_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub installations: Vec<InstallationReference>,
    /// Purpose id → app id, for organizations served by a different app.
    #[serde(default)]
    pub purpose_apps: HashMap<String, u64>,
}

fn default_active() -> bool {
    true
}

impl OrganizationSettings {
    pub fn installation_for_app(&self, app_id: u64) -> Option<u64> {
        self.installations
            .iter()
            .find(|i| i.app_id == app_id)
            .map(|i| i.installation_id)
    }

    pub fn app_override(&self, purpose_id: &str) -> Option<u64> {
        self.purpose_apps
            .iter()
            .find(|(id, _)| id.eq_ignore_ascii_case(purpose_id))
            .map(|(_, app_id)| *app_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrganizationSettingsStore {
    by_name: HashMap<String, OrganizationSettings>,
}

impl OrganizationSettingsStore {
    pub fn new(
        static_settings: impl IntoIterator<Item = OrganizationSettings>,
        dynamic_settings: impl IntoIterator<Item = OrganizationSettings>,
    ) -> Self {
        let mut by_name = HashMap::new();
        for settings in static_settings.into_iter().chain(dynamic_settings) {
            by_name.insert(settings.name.to_lowercase(), settings);
        }
        Self { by_name }
    }

    /// Builds the store, reading the dynamic layer from `dynamic_file` when set.
    pub fn load(
        static_settings: &[OrganizationSettings],
        dynamic_file: Option<&Path>,
    ) -> Result<Self> {
        let dynamic = match dynamic_file {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)?;
                serde_json::from_str::<Vec<OrganizationSettings>>(&contents)?
            }
            Some(path) => {
                tracing::warn!(path = %path.display(), "dynamic settings file not found");
                Vec::new()
            }
            None => Vec::new(),
        };
        Ok(Self::new(static_settings.iter().cloned(), dynamic))
    }

    pub fn get(&self, organization: &str) -> Option<&OrganizationSettings> {
        self.by_name.get(&organization.to_lowercase())
    }

    pub fn organizations(&self) -> Vec<&OrganizationSettings> {
        let mut all: Vec<_> = self.by_name.values().collect();
        all.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        all
    }
}
