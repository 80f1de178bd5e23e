use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::client::error::{FederationError, FederationResult};
use crate::client::saml_response::GrantedRole;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_BROKER_BASE: &str = "https://login.microsoftonline.com";
pub const DEFAULT_TOKEN_EXCHANGE_URL: &str = "https://sts.amazonaws.com/";

/// An IAM role the caller wants credentials for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedRole {
    pub account_id: String,
    pub role_name: String,
    pub profile_name: String,
    pub default_region: String,
}

impl RequestedRole {
    pub fn new(
        account_id: &str,
        role_name: &str,
        profile_name: Option<&str>,
        default_region: Option<&str>,
    ) -> FederationResult<Self> {
        if account_id.is_empty() {
            return Err(FederationError::InvalidRequestedRole {
                field: "account_id".to_string(),
            });
        }
        if role_name.is_empty() {
            return Err(FederationError::InvalidRequestedRole {
                field: "role".to_string(),
            });
        }

        let profile_name = match profile_name.filter(|p| !p.is_empty()) {
            Some(profile) => profile.to_string(),
            None => format!("getkeys-{}-{}", account_id, role_name),
        };
        let default_region = default_region
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION)
            .to_string();

        Ok(Self {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            profile_name,
            default_region,
        })
    }

    pub fn matches(&self, granted: &GrantedRole) -> bool {
        self.account_id == granted.account_id && self.role_name == granted.role_name
    }
}

/// Where the SAML assertion comes from. Exactly one source per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityProviderConfig {
    CloudBroker {
        tenant_id: String,
        application_id: String,
    },
    EnterpriseIdp {
        hostname: String,
    },
    StaticAssertion {
        file: PathBuf,
    },
}

impl IdentityProviderConfig {
    pub fn resolve(
        tenant_id: Option<&str>,
        application_id: Option<&str>,
        hostname: Option<&str>,
        static_file: Option<&str>,
    ) -> FederationResult<Self> {
        let tenant_id = tenant_id.filter(|v| !v.is_empty());
        let hostname = hostname.filter(|v| !v.is_empty());
        let static_file = static_file.filter(|v| !v.is_empty());

        let mut sources = Vec::new();
        if static_file.is_some() {
            sources.push("static".to_string());
        }
        if tenant_id.is_some() {
            sources.push("broker".to_string());
        }
        if hostname.is_some() {
            sources.push("idp".to_string());
        }
        if sources.len() > 1 {
            return Err(FederationError::MultipleIdentitySources { sources });
        }

        if let Some(file) = static_file {
            return Ok(Self::StaticAssertion {
                file: PathBuf::from(file),
            });
        }
        if let Some(tenant_id) = tenant_id {
            let application_id = application_id
                .filter(|v| !v.is_empty())
                .ok_or(FederationError::MissingApplicationId)?;
            return Ok(Self::CloudBroker {
                tenant_id: tenant_id.to_string(),
                application_id: application_id.to_string(),
            });
        }
        if let Some(hostname) = hostname {
            return Ok(Self::EnterpriseIdp {
                hostname: hostname.to_string(),
            });
        }
        Err(FederationError::NoIdentitySource)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CloudBroker { .. } => "cloud broker",
            Self::EnterpriseIdp { .. } => "enterprise IdP",
            Self::StaticAssertion { .. } => "static assertion",
        }
    }

    pub fn needs_login(&self) -> bool {
        !matches!(self, Self::StaticAssertion { .. })
    }
}

/// Remote endpoints the session talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Broker login base, tenant paths hang off it
    pub broker_base: String,
    pub token_exchange_url: String,
    /// Scheme used to reach an enterprise IdP host
    pub idp_scheme: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            broker_base: DEFAULT_BROKER_BASE.to_string(),
            token_exchange_url: DEFAULT_TOKEN_EXCHANGE_URL.to_string(),
            idp_scheme: "https".to_string(),
        }
    }
}

impl Endpoints {
    pub fn broker_sign_on(&self, tenant_id: &str) -> String {
        format!("{}/{}/saml2", self.broker_base.trim_end_matches('/'), tenant_id)
    }

    pub fn broker_metadata(&self, tenant_id: &str, application_id: &str) -> String {
        format!(
            "{}/{}/FederationMetadata/2007-06/FederationMetadata.xml?appid={}",
            self.broker_base.trim_end_matches('/'),
            tenant_id,
            application_id
        )
    }

    pub fn idp_sign_on(&self, hostname: &str) -> String {
        format!(
            "{}://{}/adfs/ls/IdpInitiatedSignOn.aspx?loginToRp=urn:amazon:webservices",
            self.idp_scheme, hostname
        )
    }

    pub fn idp_metadata(&self, hostname: &str) -> String {
        format!(
            "{}://{}/FederationMetadata/2007-06/FederationMetadata.xml",
            self.idp_scheme, hostname
        )
    }
}
