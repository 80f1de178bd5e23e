use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use super::error::{FederationError, FederationResult};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StsCredentials {
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: String,
    #[serde(default, deserialize_with = "deserialize_expiration")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumedRoleUser {
    #[serde(default)]
    pub assumed_role_id: String,
    #[serde(default)]
    pub arn: String,
}

/// Successful AssumeRoleWithSAML payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AssumeRoleResult {
    pub credentials: Option<StsCredentials>,
    pub assumed_role_user: Option<AssumedRoleUser>,
    pub audience: Option<String>,
    pub issuer: Option<String>,
    pub name_qualifier: Option<String>,
    pub subject: Option<String>,
    pub subject_type: Option<String>,
    pub packed_policy_size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FaultDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "Type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrokerFault {
    pub error: FaultDetail,
    #[serde(default)]
    pub request_id: String,
    #[serde(default)]
    pub response_metadata: Option<ResponseMetadata>,
}

impl BrokerFault {
    /// Top-level `RequestId`, else the one under `ResponseMetadata`
    pub fn request_id(&self) -> &str {
        match &self.response_metadata {
            Some(metadata) if self.request_id.is_empty() => &metadata.request_id,
            _ => &self.request_id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResponseMetadata {
    #[serde(default)]
    pub request_id: String,
}

#[derive(Debug, Deserialize)]
struct WrappedResponse {
    #[serde(rename = "AssumeRoleWithSAMLResult")]
    result: Option<AssumeRoleResult>,
    #[serde(rename = "ResponseMetadata")]
    metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "AssumeRoleWithSAMLResponse")]
    response: WrappedResponse,
}

/// Outcome of one token exchange call
#[derive(Debug, Clone, PartialEq)]
pub enum TokenExchangeResponse {
    Success {
        request_id: Option<String>,
        result: AssumeRoleResult,
    },
    Fault(BrokerFault),
}

impl TokenExchangeResponse {
    /// The service answers in three shapes: an error document, a result
    /// wrapped with response metadata, or the bare result.
    pub fn parse(body: &str) -> FederationResult<Self> {
        let malformed = |source: serde_json::Error| FederationError::MalformedResponse {
            body: body.to_string(),
            source,
        };

        if body.contains("\"Error\":") {
            let fault: BrokerFault = serde_json::from_str(body).map_err(malformed)?;
            return Ok(Self::Fault(fault));
        }

        if body.contains("ResponseMetadata") {
            let envelope: Envelope = serde_json::from_str(body).map_err(malformed)?;
            return Ok(Self::Success {
                request_id: envelope
                    .response
                    .metadata
                    .map(|m| m.request_id)
                    .filter(|id| !id.is_empty()),
                result: envelope.response.result.unwrap_or_default(),
            });
        }

        let result: AssumeRoleResult = serde_json::from_str(body).map_err(malformed)?;
        Ok(Self::Success {
            request_id: None,
            result,
        })
    }

    pub fn into_result(self) -> FederationResult<AssumeRoleResult> {
        match self {
            Self::Success { result, .. } => Ok(result),
            Self::Fault(fault) => Err(FederationError::BrokerError {
                request_id: fault.request_id().to_string(),
                code: fault.error.code,
                message: fault.error.message,
            }),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpirationValue {
    Seconds(f64),
    Text(String),
}

/// STS JSON carries epoch seconds; tolerate RFC 3339 text as well.
fn deserialize_expiration<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<ExpirationValue>::deserialize(deserializer)?;
    Ok(match value {
        None => None,
        Some(ExpirationValue::Seconds(seconds)) => from_epoch(seconds),
        Some(ExpirationValue::Text(text)) => match text.parse::<f64>() {
            Ok(seconds) => from_epoch(seconds),
            Err(_) => DateTime::parse_from_rfc3339(&text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        },
    })
}

fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(seconds.trunc() as i64, 0).single()
}
