use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::error::{FederationError, FederationResult};

pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";
pub const ROLE_SESSION_NAME_ATTRIBUTE: &str =
    "https://aws.amazon.com/SAML/Attributes/RoleSessionName";
pub const SESSION_DURATION_ATTRIBUTE: &str =
    "https://aws.amazon.com/SAML/Attributes/SessionDuration";

/// Present in every SAML 2.0 protocol document
pub const SAML_PROTOCOL_MARKER: &str = "SAML:2.0:protocol";

const STATUS_SUCCESS: &str = "status:Success";
const ROLE_ARN_PREFIX: &str = "arn:aws:iam::";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamlResponse {
    pub id: String,
    pub version: String,
    pub issue_instant: Option<DateTime<Utc>>,
    pub destination: Option<String>,
    pub issuer: Option<String>,
    pub status_code: String,
    pub assertion: Option<SamlAssertion>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamlAssertion {
    pub id: String,
    pub issue_instant: Option<DateTime<Utc>>,
    pub issuer: Option<String>,
    pub subject: Subject,
    pub conditions: Conditions,
    pub authn_statement: AuthnStatement,
    pub attribute_statement: Option<AttributeStatement>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subject {
    pub name_id: Option<String>,
    pub name_id_format: Option<String>,
    pub confirmation_method: Option<String>,
    pub recipient: Option<String>,
    pub not_on_or_after: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub audiences: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthnStatement {
    pub authn_instant: Option<DateTime<Utc>>,
    pub session_index: Option<String>,
    pub session_not_on_or_after: Option<DateTime<Utc>>,
    pub class_ref: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeStatement {
    pub attributes: Vec<SamlAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamlAttribute {
    pub name: String,
    pub name_format: Option<String>,
    pub values: Vec<String>,
}

/// An IAM role the IdP allows the subject to assume.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantedRole {
    pub account_id: String,
    pub role_name: String,
    pub role_arn: String,
    pub principal_arn: String,
}

impl GrantedRole {
    /// Parses `<principal arn>,<role arn>` where the role ARN reads
    /// `arn:aws:iam::<account>:role/<name>`.
    pub fn parse(value: &str) -> FederationResult<Self> {
        let parts: Vec<&str> = value.split(',').collect();
        if parts.len() != 2 {
            return Err(FederationError::malformed_role(
                value,
                format!("expected 2 comma-separated ARNs, found {}", parts.len()),
            ));
        }
        let (principal_arn, role_arn) = (parts[0], parts[1]);

        if !role_arn.starts_with(ROLE_ARN_PREFIX) {
            return Err(FederationError::malformed_role(
                value,
                format!("role ARN must start with {}", ROLE_ARN_PREFIX),
            ));
        }

        let arn_parts: Vec<&str> = role_arn.split(':').collect();
        if arn_parts.len() != 6 {
            return Err(FederationError::malformed_role(
                value,
                format!("role ARN has {} colon-separated parts, expected 6", arn_parts.len()),
            ));
        }

        let account_id = arn_parts[4];
        if account_id.len() != 12 || !account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FederationError::malformed_role(
                value,
                format!("invalid account id {}", account_id),
            ));
        }

        let name_parts: Vec<&str> = arn_parts[5].split('/').collect();
        if name_parts.len() != 2 || name_parts[0] != "role" || name_parts[1].is_empty() {
            return Err(FederationError::malformed_role(
                value,
                format!("invalid role path {}", arn_parts[5]),
            ));
        }

        Ok(Self {
            account_id: account_id.to_string(),
            role_name: name_parts[1].to_string(),
            role_arn: role_arn.to_string(),
            principal_arn: principal_arn.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlClaim {
    pub claim_type: String,
    pub value: String,
}

/// What the rest of the flow needs out of an assertion
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionAttributes {
    pub roles: Vec<GrantedRole>,
    pub session_name: String,
    pub session_duration: Option<u64>,
    pub issuer: Option<String>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_on_or_after: Option<DateTime<Utc>>,
    pub authenticate_by: Option<DateTime<Utc>>,
    pub claims: Vec<SamlClaim>,
    pub success: bool,
}

impl SamlResponse {
    pub fn parse(xml: &[u8]) -> FederationResult<Self> {
        let text = std::str::from_utf8(xml)
            .map_err(|e| FederationError::saml_parse(format!("not UTF-8: {}", e)))?;

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut builder = ResponseBuilder::default();
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => builder.open(&e, false)?,
                Ok(Event::Empty(e)) => builder.open(&e, true)?,
                Ok(Event::End(e)) => {
                    builder.close(&local_name(e.local_name().as_ref()));
                }
                Ok(Event::Text(e)) => {
                    let value = e
                        .unescape()
                        .map_err(|err| FederationError::saml_parse(err.to_string()))?;
                    builder.text.push_str(&value);
                }
                Ok(Event::CData(e)) => {
                    builder.text.push_str(&String::from_utf8_lossy(&e));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(FederationError::saml_parse(format!(
                        "error at position {}: {}",
                        reader.buffer_position(),
                        e
                    )))
                }
            }
        }

        builder.finish()
    }

    pub fn is_success(&self) -> bool {
        self.status_code.contains(STATUS_SUCCESS)
    }

    /// Pulls roles, session name and duration out of the first assertion.
    pub fn attributes(&self) -> FederationResult<AssertionAttributes> {
        let assertion = self
            .assertion
            .as_ref()
            .ok_or(FederationError::MissingAttributeStatement)?;
        let statement = assertion
            .attribute_statement
            .as_ref()
            .ok_or(FederationError::MissingAttributeStatement)?;

        let mut roles = Vec::new();
        let mut session_name = None;
        let mut session_duration = None;
        let mut claims = Vec::new();

        for attribute in &statement.attributes {
            match attribute.name.as_str() {
                ROLE_ATTRIBUTE => {
                    for value in &attribute.values {
                        roles.push(GrantedRole::parse(value)?);
                    }
                }
                ROLE_SESSION_NAME_ATTRIBUTE => {
                    session_name = attribute.values.first().cloned();
                }
                SESSION_DURATION_ATTRIBUTE => {
                    if let Some(value) = attribute.values.first() {
                        match value.trim().parse::<u64>() {
                            Ok(seconds) => session_duration = Some(seconds),
                            Err(e) => warn!(
                                "⚠️ Ignoring SessionDuration {:?}: {}",
                                value, e
                            ),
                        }
                    }
                }
                _ => {
                    for value in &attribute.values {
                        claims.push(SamlClaim {
                            claim_type: attribute.name.clone(),
                            value: value.clone(),
                        });
                    }
                }
            }
        }

        if roles.is_empty() {
            return Err(FederationError::NoRolesGranted);
        }
        let session_name = session_name
            .filter(|name| !name.is_empty())
            .ok_or(FederationError::NoSessionName)?;

        Ok(AssertionAttributes {
            roles,
            session_name,
            session_duration,
            issuer: assertion.issuer.clone().or_else(|| self.issuer.clone()),
            not_before: assertion.conditions.not_before,
            not_on_or_after: assertion.conditions.not_on_or_after,
            authenticate_by: assertion.subject.not_on_or_after,
            claims,
            success: self.is_success(),
        })
    }
}

/// A parsed SAML Response together with the exact bytes it came from.
/// The raw bytes are what gets presented to the token exchange.
#[derive(Debug, Clone)]
pub struct SessionAssertion {
    pub raw: Vec<u8>,
    pub response: SamlResponse,
    pub attributes: AssertionAttributes,
}

impl SessionAssertion {
    pub fn from_xml_bytes(raw: Vec<u8>) -> FederationResult<Self> {
        let response = SamlResponse::parse(&raw)?;
        let attributes = response.attributes()?;
        if !attributes.success {
            warn!("⚠️ SAML Response status is {}", response.status_code);
        }
        debug!(
            "SAML assertion for {} grants {} role(s)",
            attributes.session_name,
            attributes.roles.len()
        );
        Ok(Self {
            raw,
            response,
            attributes,
        })
    }

    /// Decodes a `SAMLResponse` form value.
    pub fn from_base64(encoded: &str) -> FederationResult<Self> {
        let raw = decode_base64(encoded)?;
        Self::from_xml_bytes(raw)
    }

    /// Accepts either an HTML page with a `SAMLResponse` input, a bare
    /// base64 value, or the XML itself.
    pub fn from_static_content(content: &str) -> FederationResult<Self> {
        let mut payload = content;
        if let Some(marker) = content.find("\"SAMLResponse\"") {
            let after = &content[marker..];
            let start = after
                .find("value=\"")
                .ok_or(FederationError::NoSamlResponseFound)?
                + "value=\"".len();
            let value = &after[start..];
            payload = value.find('"').map_or(value, |end| &value[..end]);
        }

        let raw = if payload.contains(SAML_PROTOCOL_MARKER) {
            payload.as_bytes().to_vec()
        } else {
            decode_base64(payload).map_err(|_| FederationError::NoSamlResponseFound)?
        };

        if !String::from_utf8_lossy(&raw).contains(SAML_PROTOCOL_MARKER) {
            return Err(FederationError::NoSamlResponseFound);
        }
        Self::from_xml_bytes(raw)
    }

    /// The assertion as the token exchange expects it
    pub fn encoded(&self) -> String {
        general_purpose::STANDARD.encode(&self.raw)
    }

    pub fn roles(&self) -> &[GrantedRole] {
        &self.attributes.roles
    }
}

fn decode_base64(encoded: &str) -> FederationResult<Vec<u8>> {
    let compact: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(general_purpose::STANDARD.decode(compact)?)
}

fn local_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn attributes_of(e: &BytesStart<'_>) -> FederationResult<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| FederationError::saml_parse(err.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|err| FederationError::saml_parse(err.to_string()))?;
        map.insert(local_name(attr.key.local_name().as_ref()), value.into_owned());
    }
    Ok(map)
}

fn parse_instant(value: Option<&String>) -> Option<DateTime<Utc>> {
    value.and_then(|v| match DateTime::parse_from_rfc3339(v) {
        Ok(instant) => Some(instant.with_timezone(&Utc)),
        Err(e) => {
            debug!("Unparseable SAML instant {}: {}", v, e);
            None
        }
    })
}

#[derive(Default)]
struct ResponseBuilder {
    path: Vec<String>,
    text: String,
    response: Option<SamlResponse>,
    assertion: Option<SamlAssertion>,
    attribute: Option<SamlAttribute>,
}

impl ResponseBuilder {
    fn in_assertion(&self) -> bool {
        self.path.iter().any(|p| p == "Assertion")
    }

    fn open(&mut self, e: &BytesStart<'_>, self_closing: bool) -> FederationResult<()> {
        let name = local_name(e.local_name().as_ref());
        let attrs = attributes_of(e)?;
        self.text.clear();

        if self.path.is_empty() {
            if self.response.is_some() || name != "Response" {
                return Err(FederationError::saml_parse(format!(
                    "unexpected root element {}",
                    name
                )));
            }
            self.response = Some(SamlResponse {
                id: attrs.get("ID").cloned().unwrap_or_default(),
                version: attrs.get("Version").cloned().unwrap_or_default(),
                issue_instant: parse_instant(attrs.get("IssueInstant")),
                destination: attrs.get("Destination").cloned(),
                ..Default::default()
            });
        }

        match name.as_str() {
            "StatusCode" => {
                if let Some(response) = self.response.as_mut() {
                    if response.status_code.is_empty() {
                        response.status_code = attrs.get("Value").cloned().unwrap_or_default();
                    }
                }
            }
            "Assertion" if self.assertion.is_none() => {
                self.assertion = Some(SamlAssertion {
                    id: attrs.get("ID").cloned().unwrap_or_default(),
                    issue_instant: parse_instant(attrs.get("IssueInstant")),
                    ..Default::default()
                });
            }
            _ => {}
        }

        if let Some(assertion) = self.assertion.as_mut() {
            match name.as_str() {
                "NameID" => {
                    assertion.subject.name_id_format = attrs.get("Format").cloned();
                }
                "SubjectConfirmation" => {
                    assertion.subject.confirmation_method = attrs.get("Method").cloned();
                }
                "SubjectConfirmationData" => {
                    assertion.subject.recipient = attrs.get("Recipient").cloned();
                    assertion.subject.not_on_or_after = parse_instant(attrs.get("NotOnOrAfter"));
                }
                "Conditions" => {
                    assertion.conditions.not_before = parse_instant(attrs.get("NotBefore"));
                    assertion.conditions.not_on_or_after =
                        parse_instant(attrs.get("NotOnOrAfter"));
                }
                "AuthnStatement" => {
                    let statement = &mut assertion.authn_statement;
                    statement.authn_instant = parse_instant(attrs.get("AuthnInstant"));
                    statement.session_index = attrs.get("SessionIndex").cloned();
                    statement.session_not_on_or_after =
                        parse_instant(attrs.get("SessionNotOnOrAfter"));
                }
                "AttributeStatement" => {
                    assertion
                        .attribute_statement
                        .get_or_insert_with(AttributeStatement::default);
                }
                "Attribute" => {
                    self.attribute = Some(SamlAttribute {
                        name: attrs.get("Name").cloned().unwrap_or_default(),
                        name_format: attrs.get("NameFormat").cloned(),
                        values: Vec::new(),
                    });
                }
                _ => {}
            }
        }

        self.path.push(name.clone());
        if self_closing {
            self.close(&name);
        }
        Ok(())
    }

    fn close(&mut self, name: &str) {
        let text = std::mem::take(&mut self.text).trim().to_string();
        let in_assertion = self.in_assertion();

        match name {
            "Issuer" if in_assertion => {
                if let Some(assertion) = self.assertion.as_mut() {
                    assertion.issuer = Some(text);
                }
            }
            "Issuer" => {
                if let Some(response) = self.response.as_mut() {
                    response.issuer = Some(text);
                }
            }
            "NameID" => {
                if let Some(assertion) = self.assertion.as_mut() {
                    assertion.subject.name_id = Some(text);
                }
            }
            "Audience" => {
                if let Some(assertion) = self.assertion.as_mut() {
                    assertion.conditions.audiences.push(text);
                }
            }
            "AuthnContextClassRef" => {
                if let Some(assertion) = self.assertion.as_mut() {
                    assertion.authn_statement.class_ref = Some(text);
                }
            }
            "AttributeValue" => {
                if let Some(attribute) = self.attribute.as_mut() {
                    attribute.values.push(text);
                }
            }
            "Attribute" => {
                if let (Some(attribute), Some(assertion)) =
                    (self.attribute.take(), self.assertion.as_mut())
                {
                    assertion
                        .attribute_statement
                        .get_or_insert_with(AttributeStatement::default)
                        .attributes
                        .push(attribute);
                }
            }
            "Assertion" => {
                if let (Some(response), Some(assertion)) =
                    (self.response.as_mut(), self.assertion.as_ref())
                {
                    if response.assertion.is_none() {
                        response.assertion = Some(assertion.clone());
                    }
                }
            }
            _ => {}
        }

        self.path.pop();
    }

    fn finish(self) -> FederationResult<SamlResponse> {
        if !self.path.is_empty() {
            return Err(FederationError::saml_parse(format!(
                "unclosed element {}",
                self.path.join("/")
            )));
        }
        self.response
            .ok_or_else(|| FederationError::saml_parse("document has no Response element"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESPONSE: &str = include_str!("../../assets/tests/saml.response.xml");

    fn unprefixed(roles: &[&str], session_name: Option<&str>) -> String {
        let mut xml = String::from(
            r#"<Response xmlns="urn:oasis:names:tc:SAML:2.0:protocol" ID="r1" Version="2.0"><Status><StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></Status><Assertion xmlns="urn:oasis:names:tc:SAML:2.0:assertion" ID="a1"><Issuer>https://idp.contoso.com/</Issuer><AttributeStatement>"#,
        );
        if !roles.is_empty() {
            xml.push_str(r#"<Attribute Name="https://aws.amazon.com/SAML/Attributes/Role">"#);
            for role in roles {
                xml.push_str(&format!("<AttributeValue>{}</AttributeValue>", role));
            }
            xml.push_str("</Attribute>");
        }
        if let Some(name) = session_name {
            xml.push_str(&format!(
                r#"<Attribute Name="https://aws.amazon.com/SAML/Attributes/RoleSessionName"><AttributeValue>{}</AttributeValue></Attribute>"#,
                name
            ));
        }
        xml.push_str(r#"<Attribute Name="https://aws.amazon.com/SAML/Attributes/SessionDuration"><AttributeValue>eight hours</AttributeValue></Attribute>"#);
        xml.push_str("</AttributeStatement></Assertion></Response>");
        xml
    }

    #[test]
    fn test_parse_prefixed_response() {
        let response = SamlResponse::parse(RESPONSE.as_bytes()).unwrap();
        assert_eq!(response.id, "_7f3c2c52-9f4a-4f0e-9a1f-1b2c3d4e5f60");
        assert_eq!(response.version, "2.0");
        assert!(response.is_success());
        assert_eq!(
            response.issuer.as_deref(),
            Some("https://sts.windows.net/tenant-1/")
        );

        let assertion = response.assertion.as_ref().unwrap();
        assert_eq!(assertion.id, "_9a8b7c6d-1e2f-3a4b-5c6d-7e8f9a0b1c2d");
        assert_eq!(
            assertion.subject.name_id.as_deref(),
            Some("jane.doe@contoso.com")
        );
        assert_eq!(
            assertion.subject.confirmation_method.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:cm:bearer")
        );
        assert_eq!(
            assertion.conditions.audiences,
            vec!["https://signin.aws.amazon.com/saml".to_string()]
        );
        assert!(assertion.conditions.not_before.is_some());
        assert_eq!(
            assertion.authn_statement.class_ref.as_deref(),
            Some("urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport")
        );

        let statement = assertion.attribute_statement.as_ref().unwrap();
        assert_eq!(statement.attributes.len(), 5);
        assert_eq!(statement.attributes[4].values, vec!["Jane & Doe".to_string()]);
    }

    #[test]
    fn test_extract_attributes() {
        let response = SamlResponse::parse(RESPONSE.as_bytes()).unwrap();
        let attributes = response.attributes().unwrap();

        assert_eq!(attributes.session_name, "jane.doe@contoso.com");
        assert_eq!(attributes.session_duration, Some(3600));
        assert!(attributes.success);
        assert_eq!(attributes.roles.len(), 3);
        assert_eq!(
            attributes.roles[0],
            GrantedRole {
                account_id: "123456789012".to_string(),
                role_name: "Administrator".to_string(),
                role_arn: "arn:aws:iam::123456789012:role/Administrator".to_string(),
                principal_arn: "arn:aws:iam::123456789012:saml-provider/contoso".to_string(),
            }
        );
        assert_eq!(attributes.roles[2].account_id, "210987654321");
        assert!(attributes.authenticate_by.is_some());
        assert_eq!(attributes.claims.len(), 2);
        assert!(attributes
            .claims
            .iter()
            .any(|c| c.claim_type.ends_with("tenantid") && c.value == "tenant-1"));
    }

    #[test]
    fn test_parse_default_namespace() {
        let xml = unprefixed(
            &["arn:idp,arn:aws:iam::123456789012:role/Foo"],
            Some("jane"),
        );
        let response = SamlResponse::parse(xml.as_bytes()).unwrap();
        let attributes = response.attributes().unwrap();

        assert_eq!(attributes.roles[0].role_name, "Foo");
        assert_eq!(attributes.roles[0].principal_arn, "arn:idp");
        assert_eq!(attributes.session_name, "jane");
        assert_eq!(attributes.issuer.as_deref(), Some("https://idp.contoso.com/"));
        // non-numeric durations are dropped
        assert_eq!(attributes.session_duration, None);
    }

    #[test]
    fn test_roles_keep_attribute_order() {
        let foo = "arn:idp,arn:aws:iam::123456789012:role/Foo";
        let bar = "arn:idp,arn:aws:iam::123456789012:role/Bar";
        let xml = unprefixed(&[bar, foo, bar], Some("jane"));
        let attributes = SamlResponse::parse(xml.as_bytes())
            .unwrap()
            .attributes()
            .unwrap();
        let names: Vec<&str> = attributes.roles.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(names, vec!["Bar", "Foo", "Bar"]);
    }

    #[test]
    fn test_no_roles_granted() {
        let xml = unprefixed(&[], Some("jane"));
        let err = SamlResponse::parse(xml.as_bytes())
            .unwrap()
            .attributes()
            .unwrap_err();
        assert!(matches!(err, FederationError::NoRolesGranted));
    }

    #[test]
    fn test_no_session_name() {
        let xml = unprefixed(&["arn:idp,arn:aws:iam::123456789012:role/Foo"], None);
        let err = SamlResponse::parse(xml.as_bytes())
            .unwrap()
            .attributes()
            .unwrap_err();
        assert!(matches!(err, FederationError::NoSessionName));
    }

    #[test]
    fn test_missing_attribute_statement() {
        let xml = r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="r1"><saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="a1"><saml:Issuer>x</saml:Issuer></saml:Assertion></samlp:Response>"#;
        let err = SamlResponse::parse(xml.as_bytes())
            .unwrap()
            .attributes()
            .unwrap_err();
        assert!(matches!(err, FederationError::MissingAttributeStatement));
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        let err = SamlResponse::parse(b"<html><body/></html>").unwrap_err();
        assert!(matches!(err, FederationError::SamlParse { .. }));

        let err = SamlResponse::parse(b"<samlp:Response><unclosed>").unwrap_err();
        assert!(matches!(err, FederationError::SamlParse { .. }));
    }

    #[test]
    fn test_granted_role_parse() {
        let role = GrantedRole::parse(
            "arn:aws:iam::123456789012:saml-provider/contoso,arn:aws:iam::123456789012:role/Admin",
        )
        .unwrap();
        assert_eq!(role.account_id, "123456789012");
        assert_eq!(role.role_name, "Admin");
        assert_eq!(role.role_arn, "arn:aws:iam::123456789012:role/Admin");
    }

    #[test]
    fn test_granted_role_parse_rejects_malformed() {
        let cases = [
            "arn:aws:iam::123456789012:role/Admin",
            "a,b,c",
            "arn:idp,arn:aws:sts::123456789012:role/Admin",
            "arn:idp,arn:aws:iam::123456789012:role:Admin",
            "arn:idp,arn:aws:iam::1234:role/Admin",
            "arn:idp,arn:aws:iam::123456789012:role/path/Admin",
            "arn:idp,arn:aws:iam::123456789012:user/Admin",
        ];
        for case in cases {
            let err = GrantedRole::parse(case).unwrap_err();
            assert!(
                matches!(err, FederationError::MalformedRole { .. }),
                "{} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_static_content_html_form() {
        let encoded = general_purpose::STANDARD.encode(RESPONSE);
        let html = format!(
            r#"<html><body><form method="post" action="https://signin.aws.amazon.com/saml"><input type="hidden" name="SAMLResponse" value="{}" /></form></body></html>"#,
            encoded
        );
        let assertion = SessionAssertion::from_static_content(&html).unwrap();
        assert_eq!(assertion.raw, RESPONSE.as_bytes());
        assert_eq!(assertion.roles().len(), 3);
        assert_eq!(assertion.encoded(), encoded);
    }

    #[test]
    fn test_static_content_bare_base64_and_xml() {
        let encoded = general_purpose::STANDARD.encode(RESPONSE);
        let assertion = SessionAssertion::from_static_content(&format!("{}\n", encoded)).unwrap();
        assert_eq!(assertion.attributes.session_name, "jane.doe@contoso.com");

        let assertion = SessionAssertion::from_static_content(RESPONSE).unwrap();
        assert_eq!(assertion.raw, RESPONSE.as_bytes());
    }

    #[test]
    fn test_static_content_without_response() {
        let err = SessionAssertion::from_static_content("<html>nothing to see</html>").unwrap_err();
        assert!(matches!(err, FederationError::NoSamlResponseFound));

        let err =
            SessionAssertion::from_static_content(r#"<input name="SAMLResponse">"#).unwrap_err();
        assert!(matches!(err, FederationError::NoSamlResponseFound));
    }

    #[test]
    fn test_from_base64_tolerates_line_breaks() {
        let encoded = general_purpose::STANDARD.encode(RESPONSE);
        let wrapped: String = encoded
            .as_bytes()
            .chunks(76)
            .map(|chunk| format!("{}\r\n", String::from_utf8_lossy(chunk)))
            .collect();
        let assertion = SessionAssertion::from_base64(&wrapped).unwrap();
        assert_eq!(assertion.raw, RESPONSE.as_bytes());
    }
}
