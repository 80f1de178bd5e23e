use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use quick_xml::escape::escape;
use std::io::Write;
use tracing::debug;
use uuid::Uuid;

use super::error::{FederationError, FederationResult};

/// Where AWS expects the IdP to post the SAML Response
pub const AWS_SAML_CONSUMER_URL: &str = "https://signin.aws.amazon.com/saml";

const SAML_PROTOCOL_NS: &str = "urn:oasis:names:tc:SAML:2.0:protocol";
const SAML_ASSERTION_NS: &str = "urn:oasis:names:tc:SAML:2.0:assertion";
const HTTP_POST_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

// Matches the reserved set of a form-style query escape
const QUERY_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'!')
    .add(b'"')
    .add(b'#')
    .add(b'$')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'(')
    .add(b')')
    .add(b'*')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Inputs for a broker AuthnRequest
#[derive(Debug, Clone)]
pub struct AuthnRequestParams<'a> {
    /// Broker sign-on URL, e.g. `https://login.microsoftonline.com/<tenant>/saml2`
    pub sign_on_url: &'a str,
    pub tenant_id: &'a str,
    pub application_id: &'a str,
    /// Lets the broker skip home-realm discovery
    pub domain_hint: Option<&'a str>,
}

/// A rendered AuthnRequest and the redirect URL carrying it
#[derive(Debug, Clone)]
pub struct AuthnRequest {
    pub id: String,
    pub xml: String,
    pub url: String,
    pub tenant_id: String,
    pub application_id: String,
    pub consumer_url: String,
}

impl AuthnRequest {
    pub fn build(params: &AuthnRequestParams<'_>) -> FederationResult<Self> {
        if params.application_id.is_empty() {
            return Err(FederationError::MissingApplicationId);
        }

        let id = format!("AWSSAML{}", Uuid::new_v4());
        let xml = render_xml(&id, Utc::now(), params);
        debug!("SAML Authentication Request: {}", xml);

        let encoded = encode_for_redirect(&xml)?;
        if encoded.is_empty() {
            return Err(FederationError::EmptyEncodedRequest);
        }

        Ok(Self {
            url: format!("{}?SAMLRequest={}", params.sign_on_url, encoded),
            id,
            xml,
            tenant_id: params.tenant_id.to_string(),
            application_id: params.application_id.to_string(),
            consumer_url: AWS_SAML_CONSUMER_URL.to_string(),
        })
    }
}

/// `2019-09-18T10:11:12.1234567Z`: seconds with seven fractional digits
fn issue_instant(now: DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        now.format("%Y-%m-%dT%H:%M:%S"),
        now.timestamp_subsec_nanos() / 100
    )
}

fn render_xml(id: &str, now: DateTime<Utc>, params: &AuthnRequestParams<'_>) -> String {
    let mut xml = format!(
        concat!(
            r#"<samlp:AuthnRequest xmlns:samlp="{}" xmlns:saml="{}""#,
            r#" ID="{}" Version="2.0" AssertionConsumerServiceURL="{}""#,
            r#" Destination="{}" IssueInstant="{}" ProtocolBinding="{}">"#,
            r#"<saml:Issuer>{}</saml:Issuer>"#
        ),
        SAML_PROTOCOL_NS,
        SAML_ASSERTION_NS,
        id,
        AWS_SAML_CONSUMER_URL,
        escape(params.sign_on_url),
        issue_instant(now),
        HTTP_POST_BINDING,
        escape(params.application_id),
    );

    if let Some(domain) = params.domain_hint.filter(|d| !d.is_empty()) {
        let domain = escape(domain);
        xml.push_str(&format!(
            r#"<samlp:Scoping><samlp:IDPList><samlp:IDPEntry ProviderID="https://{}" Name="{}" /></samlp:IDPList></samlp:Scoping>"#,
            domain, domain
        ));
    }

    xml.push_str("</samlp:AuthnRequest>");
    xml
}

/// Raw DEFLATE, then base64, then query escape.
fn encode_for_redirect(xml: &str) -> FederationResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| FederationError::io("<AuthnRequest>", e))?;
    let compressed = encoder
        .finish()
        .map_err(|e| FederationError::io("<AuthnRequest>", e))?;

    let encoded = general_purpose::STANDARD.encode(compressed);
    debug!("Base64-encoded, deflated SAML AuthnRequest: {}", encoded);
    Ok(utf8_percent_encode(&encoded, QUERY_ENCODE_SET).to_string())
}
