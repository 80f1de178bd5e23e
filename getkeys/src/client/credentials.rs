use chrono::{DateTime, Utc};

use super::error::{FederationError, FederationResult};
use super::sts_response::AssumeRoleResult;

/// Temporary credentials for one requested role
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub assumed_role_id: String,
    pub assumed_role_arn: String,
    pub expiration: Option<DateTime<Utc>>,
    pub profile_name: String,
    pub default_region: String,
}

impl CredentialRecord {
    pub fn from_exchange(
        result: AssumeRoleResult,
        profile_name: &str,
        default_region: &str,
    ) -> FederationResult<Self> {
        let credentials = result.credentials.unwrap_or_default();
        let user = result.assumed_role_user.unwrap_or_default();

        let record = Self {
            access_key_id: credentials.access_key_id,
            secret_access_key: credentials.secret_access_key,
            session_token: credentials.session_token,
            expiration: credentials.expiration,
            assumed_role_id: user.assumed_role_id,
            assumed_role_arn: user.arn,
            profile_name: profile_name.to_string(),
            default_region: default_region.to_string(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> FederationResult<()> {
        if self.access_key_id.is_empty() {
            return Err(FederationError::EmptyAccessKey);
        }
        if self.secret_access_key.is_empty() {
            return Err(FederationError::EmptySecretKey);
        }
        if self.session_token.is_empty() {
            return Err(FederationError::EmptySessionToken);
        }
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expires| expires <= now)
    }
}
