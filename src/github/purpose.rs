//! Purposes select which GitHub App identity backs a call.
//!
//! A portal usually registers several apps with different permission scopes
//! (a read-mostly data app, an operations app that can change membership, a
//! security app, ...). Callers tag every request with an [`AppPurpose`] and the
//! token manager maps the tag to exactly one app.

use crate::error::{PortalError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A purpose defined in configuration rather than built into the portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomAppPurpose {
    pub id: String,
    pub name: String,
}

impl PartialEq for CustomAppPurpose {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CustomAppPurpose {}

impl Hash for CustomAppPurpose {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AppPurpose {
    Data,
    CustomerFacing,
    Operations,
    BackgroundJobs,
    Updates,
    Security,
    ActionsData,
    Onboarding,
    Custom(CustomAppPurpose),
}

impl AppPurpose {
    pub const BUILT_IN: [AppPurpose; 8] = [
        AppPurpose::Data,
        AppPurpose::CustomerFacing,
        AppPurpose::Operations,
        AppPurpose::BackgroundJobs,
        AppPurpose::Updates,
        AppPurpose::Security,
        AppPurpose::ActionsData,
        AppPurpose::Onboarding,
    ];

    pub fn id(&self) -> &str {
        match self {
            AppPurpose::Data => "Data",
            AppPurpose::CustomerFacing => "CustomerFacing",
            AppPurpose::Operations => "Operations",
            AppPurpose::BackgroundJobs => "BackgroundJobs",
            AppPurpose::Updates => "Updates",
            AppPurpose::Security => "Security",
            AppPurpose::ActionsData => "ActionsData",
            AppPurpose::Onboarding => "Onboarding",
            AppPurpose::Custom(custom) => &custom.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AppPurpose::CustomerFacing => "Customer facing",
            AppPurpose::BackgroundJobs => "Background jobs",
            AppPurpose::ActionsData => "Actions data",
            AppPurpose::Custom(custom) => &custom.name,
            other => other.id(),
        }
    }

    /// Parses one of the built-in purposes, ignoring case.
    pub fn built_in(id: &str) -> Option<AppPurpose> {
        Self::BUILT_IN
            .iter()
            .find(|p| p.id().eq_ignore_ascii_case(id))
            .cloned()
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AppPurpose::Custom(_))
    }
}

impl fmt::Display for AppPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for AppPurpose {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

/// How the installation behind a call is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppAuthenticationType {
    /// Use the organization settings, falling back to asking the app.
    #[default]
    BestAvailable,
    ForceSpecificInstallation { installation_id: u64 },
}

/// Built-in purposes plus the custom ones declared in configuration.
#[derive(Debug, Clone, Default)]
pub struct PurposeRegistry {
    custom: HashMap<String, CustomAppPurpose>,
}

impl PurposeRegistry {
    pub fn new(custom: impl IntoIterator<Item = CustomAppPurpose>) -> Result<Self> {
        let mut registry = Self::default();
        for purpose in custom {
            registry.register(purpose)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, purpose: CustomAppPurpose) -> Result<()> {
        if purpose.id.trim().is_empty() {
            return Err(PortalError::InvalidParameter(
                "custom purpose id cannot be empty".into(),
            ));
        }
        if AppPurpose::built_in(&purpose.id).is_some() {
            return Err(PortalError::InvalidParameter(format!(
                "custom purpose {} collides with a built-in purpose",
                purpose.id
            )));
        }
        let key = purpose.id.to_lowercase();
        if self.custom.contains_key(&key) {
            return Err(PortalError::InvalidParameter(format!(
                "custom purpose {} is declared twice",
                purpose.id
            )));
        }
        self.custom.insert(key, purpose);
        Ok(())
    }

    pub fn resolve(&self, id: &str) -> Result<AppPurpose> {
        if let Some(purpose) = AppPurpose::built_in(id) {
            return Ok(purpose);
        }
        self.custom
            .get(&id.to_lowercase())
            .cloned()
            .map(AppPurpose::Custom)
            .ok_or_else(|| PortalError::InvalidParameter(format!("unknown purpose: {id}")))
    }

    pub fn all(&self) -> Vec<AppPurpose> {
        let mut custom: Vec<AppPurpose> = self
            .custom
            .values()
            .cloned()
            .map(AppPurpose::Custom)
            .collect();
        custom.sort_by(|a, b| a.id().cmp(b.id()));
        AppPurpose::BUILT_IN.iter().cloned().chain(custom).collect()
    }
}
