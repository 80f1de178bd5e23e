use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while federating into temporary credentials
#[derive(Error, Debug)]
pub enum FederationError {
    #[error("No identity source configured: provide a broker tenant, an IdP hostname or a static assertion file")]
    NoIdentitySource,

    #[error("Exactly one identity source may be configured, found: {sources:?}")]
    MultipleIdentitySources { sources: Vec<String> },

    #[error("No username found for authentication")]
    MissingUsername,

    #[error("No password found for authentication")]
    MissingPassword,

    #[error("Username must be in email format: {username}")]
    InvalidUsername { username: String },

    #[error("The requested role does not contain '{field}' field")]
    InvalidRequestedRole { field: String },

    #[error("Application ID is not set")]
    MissingApplicationId,

    #[error("Encoded AuthnRequest is empty")]
    EmptyEncodedRequest,

    #[error("{context}: form not found")]
    FormNotFound { context: String },

    #[error("Failed to parse URL {url}: {source}")]
    UrlParse {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("The form does not contain '{name}' field")]
    MissingRequiredField { name: String },

    #[error("Failed to parse SAML Response: {message}")]
    SamlParse { message: String },

    #[error("SAML Response does not contain attribute statements")]
    MissingAttributeStatement,

    #[error("Failed to parse SAML Role, value: {value}, error: {reason}")]
    MalformedRole { value: String, reason: String },

    #[error("AWS Roles not found in SAML assertion")]
    NoRolesGranted,

    #[error("AWS Session Name not found in SAML assertion")]
    NoSessionName,

    #[error("SAML Response not found")]
    NoSamlResponseFound,

    #[error("IdP form-based authentication failed with status {status}")]
    IdpAuthenticationFailed { status: u16 },

    #[error("Broker token request failed with status {status}")]
    BrokerTokenRequestFailed { status: u16 },

    #[error("The requested IAM Role {role_name} on account ID {account_id} was not granted by the IdP")]
    RoleNotGranted {
        account_id: String,
        role_name: String,
    },

    #[error("No roles requested")]
    NoRolesRequested,

    #[error("AWS STS {request_id}: {code}: {message}")]
    BrokerError {
        request_id: String,
        code: String,
        message: String,
    },

    #[error("Malformed token exchange response ({source}): {body}")]
    MalformedResponse {
        body: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("AccessKeyId is empty")]
    EmptyAccessKey,

    #[error("SecretAccessKey is empty")]
    EmptySecretKey,

    #[error("SessionToken is empty")]
    EmptySessionToken,

    #[error("Cannot move session from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Base64 decoding error: {source}")]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },

    #[error("HTTP client error: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input error: {message}")]
    Input { message: String },
}

impl FederationError {
    pub fn form_not_found(context: impl Into<String>) -> Self {
        Self::FormNotFound {
            context: context.into(),
        }
    }

    pub fn url_parse(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::UrlParse {
            url: url.into(),
            source,
        }
    }

    pub fn missing_field(name: impl Into<String>) -> Self {
        Self::MissingRequiredField { name: name.into() }
    }

    pub fn saml_parse(message: impl Into<String>) -> Self {
        Self::SamlParse {
            message: message.into(),
        }
    }

    pub fn malformed_role(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRole {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn role_not_granted(account_id: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self::RoleNotGranted {
            account_id: account_id.into(),
            role_name: role_name.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }
}

pub type FederationResult<T> = Result<T, FederationError>;
