use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::client::error::FederationResult;
use crate::common::types::{IdentityProviderConfig, RequestedRole};

pub const CONFIG_FILE_NAME: &str = "getkeys.yaml";

/// Settings read from `getkeys.yaml`. Every section is optional and command
/// line flags win over whatever is here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GetKeysConfig {
    pub username: Option<String>,
    pub password: Option<String>,

    /// Cloud identity broker tenant
    pub broker: Option<BrokerConfig>,

    /// Enterprise IdP reached directly
    pub idp: Option<IdpConfig>,

    /// Previously captured SAML Response
    pub static_assertion: Option<StaticAssertionConfig>,

    pub roles: Vec<RoleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub tenant_id: Option<String>,
    pub application_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdpConfig {
    pub hostname: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticAssertionConfig {
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

impl GetKeysConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.broker.as_ref().and_then(|b| b.tenant_id.as_deref())
    }

    pub fn application_id(&self) -> Option<&str> {
        self.broker.as_ref().and_then(|b| b.application_id.as_deref())
    }

    pub fn idp_hostname(&self) -> Option<&str> {
        self.idp.as_ref().map(|i| i.hostname.as_str())
    }

    pub fn static_file(&self) -> Option<&str> {
        self.static_assertion.as_ref().map(|s| s.file.as_str())
    }

    pub fn broker_mut(&mut self) -> &mut BrokerConfig {
        self.broker.get_or_insert_with(BrokerConfig::default)
    }

    pub fn identity(&self) -> FederationResult<IdentityProviderConfig> {
        IdentityProviderConfig::resolve(
            self.tenant_id(),
            self.application_id(),
            self.idp_hostname(),
            self.static_file(),
        )
    }

    pub fn requested_roles(&self) -> FederationResult<Vec<RequestedRole>> {
        self.roles
            .iter()
            .map(|role| {
                RequestedRole::new(
                    &role.account_id,
                    &role.role,
                    role.profile_name.as_deref(),
                    role.region.as_deref(),
                )
            })
            .collect()
    }
}

/// Search order for the configuration file
pub fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from(CONFIG_FILE_NAME),
        Path::new("config").join(CONFIG_FILE_NAME),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".aws").join(CONFIG_FILE_NAME));
    }
    paths
}

/// An explicit path has to exist, otherwise the first existing candidate is
/// used. No file at all is fine.
pub fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.is_file() {
            bail!("Config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    Ok(candidate_paths().into_iter().find(|p| p.is_file()))
}

/// Metadata is cached next to the configuration file in use
pub fn metadata_dir(config_path: Option<&Path>) -> Option<PathBuf> {
    config_path.map(|p| match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    })
}
