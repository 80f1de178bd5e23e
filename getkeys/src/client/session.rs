use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::authn_request::{AuthnRequest, AuthnRequestParams};
use super::credentials::CredentialRecord;
use super::error::{FederationError, FederationResult};
use super::forms::{self, FormRule, SAML_RESPONSE_FIELD};
use super::metadata::{self, FederationMetadata};
use super::saml_response::{AssertionAttributes, GrantedRole, SessionAssertion};
use super::sts_response::TokenExchangeResponse;
use crate::common::types::{Endpoints, IdentityProviderConfig, RequestedRole};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const STS_API_VERSION: &str = "2011-06-15";

/// Client with a cookie jar shared by every hop of one run
pub fn http_client() -> FederationResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .cookie_store(true)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

/// Everything a session needs to know up front
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub identity: IdentityProviderConfig,
    pub roles: Vec<RequestedRole>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Where federation metadata is cached, if anywhere
    pub metadata_dir: Option<PathBuf>,
    pub endpoints: Endpoints,
}

/// A requested role together with the grant that covers it
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRole {
    pub requested: RequestedRole,
    pub granted: GrantedRole,
}

#[derive(Debug)]
pub enum SessionState {
    Init,
    MetadataReady,
    UrlReady,
    Authenticating,
    AssertionReady(SessionAssertion),
    RolesValidated {
        assertion: SessionAssertion,
        matched: Vec<MatchedRole>,
    },
    Exchanging,
    Done(Vec<CredentialRecord>),
    Failed(String),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Init => "Init",
            Self::MetadataReady => "MetadataReady",
            Self::UrlReady => "UrlReady",
            Self::Authenticating => "Authenticating",
            Self::AssertionReady(_) => "AssertionReady",
            Self::RolesValidated { .. } => "RolesValidated",
            Self::Exchanging => "Exchanging",
            Self::Done(_) => "Done",
            Self::Failed(_) => "Failed",
        }
    }
}

/// One run of the federation conversation, from metadata to credentials.
pub struct AuthSession {
    http: reqwest::Client,
    config: SessionConfig,
    metadata: Option<FederationMetadata>,
    auth_url: Option<String>,
    state: SessionState,
}

impl AuthSession {
    pub fn new(config: SessionConfig) -> FederationResult<Self> {
        Ok(Self::with_client(http_client()?, config))
    }

    pub fn with_client(http: reqwest::Client, config: SessionConfig) -> Self {
        Self {
            http,
            config,
            metadata: None,
            auth_url: None,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn metadata(&self) -> Option<&FederationMetadata> {
        self.metadata.as_ref()
    }

    pub fn auth_url(&self) -> Option<&str> {
        self.auth_url.as_deref()
    }

    /// Drive the session to `Done`. Any failure leaves it `Failed`.
    pub async fn run(&mut self) -> FederationResult<Vec<CredentialRecord>> {
        match self.drive().await {
            Ok(records) => Ok(records),
            Err(e) => {
                error!(
                    "❌ {} session failed during {}: {}",
                    self.config.identity.kind(),
                    self.state.name(),
                    e
                );
                self.state = SessionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> FederationResult<Vec<CredentialRecord>> {
        self.prepare_metadata().await?;
        self.resolve_auth_url()?;
        self.authenticate().await?;
        self.validate_roles()?;
        self.exchange().await
    }

    pub async fn prepare_metadata(&mut self) -> FederationResult<()> {
        if !matches!(self.state, SessionState::Init) {
            return Err(self.invalid("MetadataReady"));
        }

        self.metadata = metadata::load(
            &self.http,
            &self.config.identity,
            &self.config.endpoints,
            self.config.metadata_dir.as_deref(),
        )
        .await?;

        if let Some(metadata) = &self.metadata {
            info!(
                "📋 Federation metadata ready ({} bytes{})",
                metadata.raw.len(),
                if metadata.from_cache { ", cached" } else { "" }
            );
            debug!("Metadata URL: {}", metadata.url);
            if let Some(path) = &metadata.cache_path {
                debug!("Metadata cache file: {}", path.display());
            }
            if let Some(entity_id) = metadata.entity_id() {
                debug!("Metadata entity: {}", entity_id);
            }
        }
        self.state = SessionState::MetadataReady;
        Ok(())
    }

    /// Fix the URL authentication starts from. Calling it again keeps the
    /// URL already chosen.
    pub fn resolve_auth_url(&mut self) -> FederationResult<Option<&str>> {
        if !matches!(
            self.state,
            SessionState::MetadataReady | SessionState::UrlReady
        ) {
            return Err(self.invalid("UrlReady"));
        }

        if self.auth_url.is_none() {
            let endpoints = &self.config.endpoints;
            self.auth_url = match &self.config.identity {
                IdentityProviderConfig::CloudBroker { tenant_id, .. } => {
                    Some(endpoints.broker_sign_on(tenant_id))
                }
                IdentityProviderConfig::EnterpriseIdp { hostname } => {
                    Some(endpoints.idp_sign_on(hostname))
                }
                IdentityProviderConfig::StaticAssertion { .. } => None,
            };
            if let Some(url) = &self.auth_url {
                debug!("Authentication URL: {}", url);
            }
        }

        self.state = SessionState::UrlReady;
        Ok(self.auth_url.as_deref())
    }

    pub async fn authenticate(&mut self) -> FederationResult<()> {
        if !matches!(self.state, SessionState::UrlReady) {
            return Err(self.invalid("Authenticating"));
        }
        self.state = SessionState::Authenticating;

        let assertion = match self.config.identity.clone() {
            IdentityProviderConfig::CloudBroker {
                tenant_id,
                application_id,
            } => {
                let auth_url = self.require_auth_url()?;
                self.authenticate_with_broker(&auth_url, &tenant_id, &application_id)
                    .await?
            }
            IdentityProviderConfig::EnterpriseIdp { .. } => {
                let auth_url = self.require_auth_url()?;
                self.authenticate_with_idp(&auth_url).await?
            }
            IdentityProviderConfig::StaticAssertion { file } => {
                self.read_static_assertion(&file).await?
            }
        };

        log_assertion(&assertion.attributes);
        self.state = SessionState::AssertionReady(assertion);
        Ok(())
    }

    /// Every requested role has to be granted before anything is exchanged.
    pub fn validate_roles(&mut self) -> FederationResult<()> {
        let SessionState::AssertionReady(assertion) = &self.state else {
            return Err(self.invalid("RolesValidated"));
        };
        let matched = match_roles(&self.config.roles, assertion.roles())?;
        for role in &matched {
            debug!(
                "The requested IAM Role {} on account ID {} was granted",
                role.granted.role_name, role.granted.account_id
            );
        }

        if let SessionState::AssertionReady(assertion) =
            std::mem::replace(&mut self.state, SessionState::Exchanging)
        {
            self.state = SessionState::RolesValidated { assertion, matched };
        }
        Ok(())
    }

    /// Exchange the assertion once per matched role. A role that fails is
    /// logged and skipped.
    pub async fn exchange(&mut self) -> FederationResult<Vec<CredentialRecord>> {
        let (assertion, matched) =
            match std::mem::replace(&mut self.state, SessionState::Exchanging) {
                SessionState::RolesValidated { assertion, matched } => (assertion, matched),
                other => {
                    self.state = other;
                    return Err(self.invalid("Exchanging"));
                }
            };
        if matched.is_empty() {
            return Err(FederationError::NoRolesRequested);
        }

        let encoded = assertion.encoded();
        let mut records = Vec::with_capacity(matched.len());
        for role in &matched {
            info!(
                "🎫 Assuming {} on account {}",
                role.granted.role_name, role.granted.account_id
            );
            match self.assume_role(&encoded, role).await {
                Ok(record) => {
                    info!("✅ Credentials ready for profile {}", record.profile_name);
                    records.push(record);
                }
                Err(e) => warn!(
                    "⚠️ Skipping {} on account {}: {}",
                    role.granted.role_name, role.granted.account_id, e
                ),
            }
        }

        self.state = SessionState::Done(records.clone());
        Ok(records)
    }

    fn invalid(&self, to: &'static str) -> FederationError {
        FederationError::InvalidTransition {
            from: self.state.name(),
            to,
        }
    }

    fn require_auth_url(&self) -> FederationResult<String> {
        self.auth_url
            .clone()
            .ok_or(FederationError::InvalidTransition {
                from: "MetadataReady",
                to: "Authenticating",
            })
    }

    fn login_credentials(&self) -> FederationResult<(&str, &str)> {
        let username = self
            .config
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(FederationError::MissingUsername)?;
        let password = self
            .config
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(FederationError::MissingPassword)?;
        Ok((username, password))
    }

    /// Broker redirect, IdP form login, relay back to the broker, then
    /// collect the SAML Response it hands out.
    async fn authenticate_with_broker(
        &self,
        auth_url: &str,
        tenant_id: &str,
        application_id: &str,
    ) -> FederationResult<SessionAssertion> {
        let (username, password) = self.login_credentials()?;
        let domain = email_domain(username)?;
        let request = AuthnRequest::build(&AuthnRequestParams {
            sign_on_url: auth_url,
            tenant_id,
            application_id,
            domain_hint: Some(domain),
        })?;

        info!("🔐 Requesting authentication from the broker");
        debug!("AuthnRequest {} for application {}", request.id, request.application_id);
        let response = self.http.get(&request.url).send().await?;
        debug!("Broker sent us to {} ({})", response.url(), response.status());
        let login_page = response.text().await?;
        let login_form = forms::locate(&login_page, &FormRule::idp_login(), "IdP login page")?;

        info!("🔑 Signing in as {} at {}", username, login_form.host);
        let response = self
            .http
            .post(&login_form.url)
            .form(&[
                ("UserName", username),
                ("Password", password),
                ("Kmsi", "true"),
                ("AuthMethod", "FormsAuthentication"),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("IdP responded with {}: {}", status, body);
        if status != StatusCode::OK {
            return Err(FederationError::IdpAuthenticationFailed {
                status: status.as_u16(),
            });
        }
        let idp_form = forms::harvest_idp_response(&body)?;

        info!("🔁 Relaying the IdP response to {}", idp_form.location.host);
        let response = self
            .http
            .post(&idp_form.location.url)
            .form(&idp_form.fields)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Broker responded with {}: {}", status, body);
        if status != StatusCode::OK {
            return Err(FederationError::BrokerTokenRequestFailed {
                status: status.as_u16(),
            });
        }

        let broker_form = forms::harvest_broker_response(&body)?;
        let encoded = broker_form
            .field(SAML_RESPONSE_FIELD)
            .ok_or_else(|| FederationError::missing_field(SAML_RESPONSE_FIELD))?;
        SessionAssertion::from_base64(encoded)
    }

    /// IdP-initiated sign-on: a single form POST answered with a SAML
    /// Response form.
    async fn authenticate_with_idp(&self, auth_url: &str) -> FederationResult<SessionAssertion> {
        let (username, password) = self.login_credentials()?;

        info!("🔑 Signing in as {} at the IdP", username);
        let response = self
            .http
            .post(auth_url)
            .form(&[
                ("UserName", username),
                ("Password", password),
                ("AuthMethod", "FormsAuthentication"),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("IdP responded with {}: {}", status, body);
        if status != StatusCode::OK {
            return Err(FederationError::IdpAuthenticationFailed {
                status: status.as_u16(),
            });
        }

        let form = forms::harvest_saml_response(&body, "IdP sign-on response")?;
        let encoded = form
            .field(SAML_RESPONSE_FIELD)
            .ok_or_else(|| FederationError::missing_field(SAML_RESPONSE_FIELD))?;
        SessionAssertion::from_base64(encoded)
    }

    async fn read_static_assertion(&self, file: &Path) -> FederationResult<SessionAssertion> {
        info!("📄 Reading SAML Response from {}", file.display());
        let content = tokio::fs::read(file)
            .await
            .map_err(|e| FederationError::io(file, e))?;
        SessionAssertion::from_static_content(&String::from_utf8_lossy(&content))
    }

    async fn assume_role(
        &self,
        encoded_assertion: &str,
        role: &MatchedRole,
    ) -> FederationResult<CredentialRecord> {
        let url = &self.config.endpoints.token_exchange_url;
        debug!("Token exchange URL: {}", url);

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("Version", STS_API_VERSION),
                ("Action", "AssumeRoleWithSAML"),
                ("RoleArn", role.granted.role_arn.as_str()),
                ("PrincipalArn", role.granted.principal_arn.as_str()),
                ("SAMLAssertion", encoded_assertion),
            ])
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!("Token exchange responded with {}", status);

        let response = TokenExchangeResponse::parse(&body)?;
        if let TokenExchangeResponse::Success {
            request_id: Some(request_id),
            ..
        } = &response
        {
            debug!("Token exchange request ID: {}", request_id);
        }
        let result = response.into_result()?;
        CredentialRecord::from_exchange(
            result,
            &role.requested.profile_name,
            &role.requested.default_region,
        )
    }
}

/// Pair every requested role with its grant, in request order.
pub fn match_roles(
    requested: &[RequestedRole],
    granted: &[GrantedRole],
) -> FederationResult<Vec<MatchedRole>> {
    requested
        .iter()
        .map(|role| {
            granted
                .iter()
                .find(|g| role.matches(g))
                .map(|g| MatchedRole {
                    requested: role.clone(),
                    granted: g.clone(),
                })
                .ok_or_else(|| FederationError::role_not_granted(&role.account_id, &role.role_name))
        })
        .collect()
}

fn email_domain(username: &str) -> FederationResult<&str> {
    match username.split('@').collect::<Vec<_>>()[..] {
        [local, domain] if !local.is_empty() && !domain.is_empty() => Ok(domain),
        _ => Err(FederationError::InvalidUsername {
            username: username.to_string(),
        }),
    }
}

fn log_assertion(attributes: &AssertionAttributes) {
    info!("👤 Authorized session name: {}", attributes.session_name);
    info!("🎭 {} role(s) granted", attributes.roles.len());
    for role in &attributes.roles {
        debug!("  - {} on account ID {}", role.role_name, role.account_id);
    }
    if let Some(duration) = attributes.session_duration {
        debug!("Authorized session duration: {}s", duration);
    }
    if let Some(deadline) = attributes.authenticate_by {
        debug!("Authentication expected by: {}", deadline);
    }
    debug!(
        "Session limited between {:?} and {:?}",
        attributes.not_before, attributes.not_on_or_after
    );
    for claim in &attributes.claims {
        debug!("  - {} => {}", claim.claim_type, claim.value);
    }
    if let Some(issuer) = &attributes.issuer {
        debug!("SAML Issuer: {}", issuer);
    }
    debug!("SAML Success: {}", attributes.success);
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose, Engine as _};
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SAML_RESPONSE: &str = include_str!("../../assets/tests/saml.response.xml");

    const STS_SUCCESS: &str = r#"{"AssumeRoleWithSAMLResponse":{"AssumeRoleWithSAMLResult":{"AssumedRoleUser":{"Arn":"arn:aws:sts::123456789012:assumed-role/Administrator/jane.doe@contoso.com","AssumedRoleId":"AROAEXAMPLE:jane.doe@contoso.com"},"Credentials":{"AccessKeyId":"ASIAEXAMPLE","Expiration":1.568829807E9,"SecretAccessKey":"secret","SessionToken":"token"}},"ResponseMetadata":{"RequestId":"req-1"}}}"#;

    const STS_FAULT: &str = r#"{"Error":{"Code":"AccessDenied","Message":"Not authorized to perform sts:AssumeRoleWithSAML","Type":"Sender"},"RequestId":"req-2"}"#;

    fn saml_response_form(action: &str) -> String {
        format!(
            r#"<html><body onload="document.forms[0].submit()"><form method="POST" name="hiddenform" action="{}"><input type="hidden" name="SAMLResponse" value="{}" /><noscript><input type="submit" value="Continue" /></noscript></form></body></html>"#,
            action,
            general_purpose::STANDARD.encode(SAML_RESPONSE)
        )
    }

    fn role(account_id: &str, role_name: &str) -> RequestedRole {
        RequestedRole::new(account_id, role_name, None, None).unwrap()
    }

    fn config(identity: IdentityProviderConfig, server: &MockServer) -> SessionConfig {
        SessionConfig {
            identity,
            roles: vec![role("123456789012", "Administrator")],
            username: Some("jane.doe@contoso.com".to_string()),
            password: Some("Secret1!".to_string()),
            metadata_dir: None,
            endpoints: Endpoints {
                broker_base: server.uri(),
                token_exchange_url: format!("{}/sts", server.uri()),
                idp_scheme: "http".to_string(),
            },
        }
    }

    fn static_config(server: &MockServer, dir: &tempfile::TempDir) -> SessionConfig {
        let file = dir.path().join("saml.response.html");
        std::fs::write(&file, saml_response_form("https://signin.aws.amazon.com/saml")).unwrap();
        config(IdentityProviderConfig::StaticAssertion { file }, server)
    }

    async fn mount_sts_success(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/sts"))
            .and(header("accept", "application/json"))
            .and(body_string_contains("Action=AssumeRoleWithSAML"))
            .and(body_string_contains("Version=2011-06-15"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STS_SUCCESS))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_static_assertion_end_to_end() {
        let server = MockServer::start().await;
        mount_sts_success(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let mut session = AuthSession::new(static_config(&server, &dir)).unwrap();
        let records = session.run().await.unwrap();

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.access_key_id, "ASIAEXAMPLE");
        assert_eq!(record.secret_access_key, "secret");
        assert_eq!(record.session_token, "token");
        assert_eq!(record.profile_name, "getkeys-123456789012-Administrator");
        assert_eq!(record.default_region, "us-east-1");
        assert!(matches!(session.state(), SessionState::Done(r) if r.len() == 1));
        assert!(session.metadata().is_none());
        assert!(session.auth_url().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_role_fails_before_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STS_SUCCESS))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = static_config(&server, &dir);
        config.roles = vec![
            role("123456789012", "Administrator"),
            role("123456789012", "Auditor"),
        ];
        let mut session = AuthSession::new(config).unwrap();
        let err = session.run().await.unwrap_err();

        match err {
            FederationError::RoleNotGranted {
                account_id,
                role_name,
            } => {
                assert_eq!(account_id, "123456789012");
                assert_eq!(role_name, "Auditor");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_failed_role_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sts"))
            .and(body_string_contains("role%2FReadOnly"))
            .respond_with(ResponseTemplate::new(403).set_body_string(STS_FAULT))
            .expect(1)
            .mount(&server)
            .await;
        mount_sts_success(&server).await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = static_config(&server, &dir);
        config.roles = vec![
            role("123456789012", "Administrator"),
            role("123456789012", "ReadOnly"),
        ];
        let mut session = AuthSession::new(config).unwrap();
        let records = session.run().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].profile_name, "getkeys-123456789012-Administrator");
    }

    #[tokio::test]
    async fn test_no_roles_requested() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();

        let mut config = static_config(&server, &dir);
        config.roles.clear();
        let mut session = AuthSession::new(config).unwrap();
        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FederationError::NoRolesRequested));
    }

    #[tokio::test]
    async fn test_broker_federation_flow() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/tenant-1/FederationMetadata/2007-06/FederationMetadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tenant-1/saml2"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/adfs/ls/?SAMLRequest=abc", base).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/adfs/ls/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "MSISContext=ctx; Path=/")
                    .set_body_string(format!(
                        r#"<html><body>
                        <form id="loginForm" method="post" action="{base}/adfs/ls/"></form>
                        <form id="options" method="post" action="{base}/adfs/ls/?SAMLRequest=abc&amp;client-request-id=1">
                        <input id="userNameInput" name="UserName" type="email" value="" />
                        <input id="passwordInput" name="Password" type="password" />
                        </form></body></html>"#
                    )),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/adfs/ls/"))
            .and(header("cookie", "MSISContext=ctx"))
            .and(body_string_contains("UserName=jane.doe%40contoso.com"))
            .and(body_string_contains("Kmsi=true"))
            .and(body_string_contains("AuthMethod=FormsAuthentication"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body><form method="POST" name="hiddenform" action="{base}/login.srf">
                <input type="hidden" name="wa" value="wsignin1.0" />
                <input type="hidden" name="wresult" value="&lt;t:RequestSecurityTokenResponse&gt;&lt;ds:DigestValue&gt;q1E8 Wn3r&lt;/ds:DigestValue&gt;&lt;/t:RequestSecurityTokenResponse&gt;" />
                <input type="hidden" name="wctx" value="estsredirect=2" />
                </form></body></html>"#
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login.srf"))
            .and(body_string_contains("LoginOptions=1"))
            .and(body_string_contains("q1E8Wn3r"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(saml_response_form("https://signin.aws.amazon.com/saml")),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_sts_success(&server).await;

        let identity = IdentityProviderConfig::CloudBroker {
            tenant_id: "tenant-1".to_string(),
            application_id: "app-1".to_string(),
        };
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(identity, &server);
        config.metadata_dir = Some(dir.path().to_path_buf());

        let mut session = AuthSession::new(config).unwrap();
        let records = session.run().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assumed_role_id, "AROAEXAMPLE:jane.doe@contoso.com");
        assert_eq!(session.auth_url(), Some(format!("{}/tenant-1/saml2", base).as_str()));
        assert!(dir
            .path()
            .join("broker.tenant-1.app-1.metadata.xml")
            .exists());
    }

    /// Metadata, the broker redirect and the IdP login page
    async fn mount_broker_login(server: &MockServer) {
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/tenant-1/FederationMetadata/2007-06/FederationMetadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/tenant-1/saml2"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("location", format!("{}/adfs/ls/?SAMLRequest=abc", base).as_str()),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/adfs/ls/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body>
                <form id="loginForm" method="post" action="{base}/adfs/ls/"></form>
                <form id="options" method="post" action="{base}/adfs/ls/?SAMLRequest=abc&amp;client-request-id=1">
                <input id="userNameInput" name="UserName" type="email" value="" />
                <input id="passwordInput" name="Password" type="password" />
                </form></body></html>"#
            )))
            .mount(server)
            .await;
    }

    async fn mount_sts_untouched(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/sts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STS_SUCCESS))
            .expect(0)
            .mount(server)
            .await;
    }

    fn broker_identity() -> IdentityProviderConfig {
        IdentityProviderConfig::CloudBroker {
            tenant_id: "tenant-1".to_string(),
            application_id: "app-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_broker_flow_idp_rejects_credentials() {
        let server = MockServer::start().await;
        mount_broker_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/adfs/ls/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login.srf"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        mount_sts_untouched(&server).await;

        let mut session = AuthSession::new(config(broker_identity(), &server)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FederationError::IdpAuthenticationFailed { status: 401 }));
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_broker_flow_token_request_fails() {
        let server = MockServer::start().await;
        let base = server.uri();
        mount_broker_login(&server).await;
        Mock::given(method("POST"))
            .and(path("/adfs/ls/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!(
                r#"<html><body><form method="POST" name="hiddenform" action="{base}/login.srf">
                <input type="hidden" name="wa" value="wsignin1.0" />
                <input type="hidden" name="wresult" value="&lt;t:RequestSecurityTokenResponse&gt;&lt;/t:RequestSecurityTokenResponse&gt;" />
                <input type="hidden" name="wctx" value="estsredirect=2" />
                </form></body></html>"#
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login.srf"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        mount_sts_untouched(&server).await;

        let mut session = AuthSession::new(config(broker_identity(), &server)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FederationError::BrokerTokenRequestFailed { status: 500 }));
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_broker_rejects_non_email_username() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .mount(&server)
            .await;

        let identity = IdentityProviderConfig::CloudBroker {
            tenant_id: "tenant-1".to_string(),
            application_id: "app-1".to_string(),
        };
        let mut config = config(identity, &server);
        config.username = Some("jane".to_string());

        let mut session = AuthSession::new(config).unwrap();
        let err = session.run().await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidUsername { .. }));
    }

    #[tokio::test]
    async fn test_direct_idp_flow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/FederationMetadata/2007-06/FederationMetadata.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/adfs/ls/IdpInitiatedSignOn.aspx"))
            .and(body_string_contains("UserName=jane.doe%40contoso.com"))
            .and(body_string_contains("AuthMethod=FormsAuthentication"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(saml_response_form("https://signin.aws.amazon.com/saml")),
            )
            .expect(1)
            .mount(&server)
            .await;
        mount_sts_success(&server).await;

        let hostname = server.uri().trim_start_matches("http://").to_string();
        let identity = IdentityProviderConfig::EnterpriseIdp { hostname };
        let mut session = AuthSession::new(config(identity, &server)).unwrap();
        let records = session.run().await.unwrap();

        assert_eq!(records.len(), 1);
        assert!(session
            .auth_url()
            .unwrap()
            .ends_with("/adfs/ls/IdpInitiatedSignOn.aspx?loginToRp=urn:amazon:webservices"));
    }

    #[tokio::test]
    async fn test_direct_idp_rejects_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/adfs/ls/IdpInitiatedSignOn.aspx"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let hostname = server.uri().trim_start_matches("http://").to_string();
        let identity = IdentityProviderConfig::EnterpriseIdp { hostname };
        let mut session = AuthSession::new(config(identity, &server)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, FederationError::IdpAuthenticationFailed { status: 401 }));
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }

    #[tokio::test]
    async fn test_missing_password() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<EntityDescriptor/>"))
            .mount(&server)
            .await;

        let hostname = server.uri().trim_start_matches("http://").to_string();
        let mut config = config(IdentityProviderConfig::EnterpriseIdp { hostname }, &server);
        config.password = None;
        let err = AuthSession::new(config).unwrap().run().await.unwrap_err();
        assert!(matches!(err, FederationError::MissingPassword));
    }

    #[tokio::test]
    async fn test_metadata_cache_hit_reaches_metadata_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("broker.tenant-1.app-1.metadata.xml"),
            "<EntityDescriptor/>",
        )
        .unwrap();
        let identity = IdentityProviderConfig::CloudBroker {
            tenant_id: "tenant-1".to_string(),
            application_id: "app-1".to_string(),
        };
        let mut config = config(identity, &server);
        config.metadata_dir = Some(dir.path().to_path_buf());

        let mut session = AuthSession::new(config).unwrap();
        session.prepare_metadata().await.unwrap();
        assert_eq!(session.state().name(), "MetadataReady");
        assert!(session.metadata().unwrap().from_cache);

        let first = session.resolve_auth_url().unwrap().map(str::to_string);
        let second = session.resolve_auth_url().unwrap().map(str::to_string);
        assert_eq!(first, second);
        assert_eq!(session.state().name(), "UrlReady");
    }

    #[tokio::test]
    async fn test_out_of_order_calls_are_rejected() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let mut session = AuthSession::new(static_config(&server, &dir)).unwrap();

        let err = session.validate_roles().unwrap_err();
        assert!(matches!(
            err,
            FederationError::InvalidTransition {
                from: "Init",
                to: "RolesValidated"
            }
        ));
        let err = session.exchange().await.unwrap_err();
        assert!(matches!(err, FederationError::InvalidTransition { from: "Init", .. }));
        assert_eq!(session.state().name(), "Init");

        session.prepare_metadata().await.unwrap();
        let err = session.prepare_metadata().await.unwrap_err();
        assert!(matches!(
            err,
            FederationError::InvalidTransition {
                from: "MetadataReady",
                ..
            }
        ));
    }

    #[test]
    fn test_match_roles_keeps_request_order() {
        let granted = vec![
            GrantedRole::parse("arn:idp,arn:aws:iam::123456789012:role/A").unwrap(),
            GrantedRole::parse("arn:idp,arn:aws:iam::123456789012:role/B").unwrap(),
        ];
        let requested = vec![role("123456789012", "B"), role("123456789012", "A")];
        let matched = match_roles(&requested, &granted).unwrap();
        assert_eq!(matched[0].granted.role_name, "B");
        assert_eq!(matched[1].granted.role_name, "A");
    }

    #[test]
    fn test_email_domain() {
        assert_eq!(email_domain("jane@contoso.com").unwrap(), "contoso.com");
        assert!(email_domain("jane").is_err());
        assert!(email_domain("@contoso.com").is_err());
        assert!(email_domain("a@b@c").is_err());
    }
}
