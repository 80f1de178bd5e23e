use select::document::Document;
use select::node::Node;
use select::predicate::{Name, Predicate};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

use super::error::{FederationError, FederationResult};

/// Fields the IdP hands back to the broker after a successful login
pub const IDP_RESPONSE_FIELDS: [&str; 3] = ["wa", "wctx", "wresult"];

/// Field carrying the base64-encoded SAML Response
pub const SAML_RESPONSE_FIELD: &str = "SAMLResponse";

/// Elements inside `wresult` whose base64 bodies the IdP pretty-prints with spaces
const SIGNED_ELEMENTS: [&str; 3] = ["X509Certificate", "SignatureValue", "DigestValue"];

/// A single condition a form attribute has to satisfy
#[derive(Debug, Clone)]
pub enum AttrCondition {
    Equals {
        key: &'static str,
        value: &'static str,
    },
    StartsWith {
        key: &'static str,
        prefix: &'static str,
    },
}

impl AttrCondition {
    fn holds(&self, node: &Node) -> bool {
        match self {
            Self::Equals { key, value } => node.attr(key) == Some(*value),
            Self::StartsWith { key, prefix } => {
                node.attr(key).is_some_and(|v| v.starts_with(prefix))
            }
        }
    }
}

/// Declarative description of the form to look for. A `<form>` qualifies only
/// when every condition holds.
#[derive(Debug, Clone, Default)]
pub struct FormRule {
    conditions: Vec<AttrCondition>,
}

impl FormRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr_equals(mut self, key: &'static str, value: &'static str) -> Self {
        self.conditions.push(AttrCondition::Equals { key, value });
        self
    }

    pub fn attr_starts_with(mut self, key: &'static str, prefix: &'static str) -> Self {
        self.conditions
            .push(AttrCondition::StartsWith { key, prefix });
        self
    }

    /// The enterprise IdP login page posts its credentials through the
    /// `options` form.
    pub fn idp_login() -> Self {
        Self::new()
            .attr_equals("id", "options")
            .attr_equals("method", "post")
            .attr_starts_with("action", "http")
    }

    /// Auto-submitting response forms only need an absolute action.
    pub fn absolute_action() -> Self {
        Self::new().attr_starts_with("action", "http")
    }
}

impl Predicate for FormRule {
    fn matches(&self, node: &Node) -> bool {
        node.name() == Some("form") && self.conditions.iter().all(|c| c.holds(node))
    }
}

/// Where a form submits to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormLocation {
    pub url: String,
    pub host: String,
    pub port: Option<u16>,
}

impl FormLocation {
    fn from_action(action: &str) -> FederationResult<Self> {
        let parsed = Url::parse(action).map_err(|e| FederationError::url_parse(action, e))?;
        Ok(Self {
            url: action.to_string(),
            host: parsed.host_str().unwrap_or_default().to_string(),
            port: parsed.port(),
        })
    }
}

/// A located form together with its named input values
#[derive(Debug, Clone)]
pub struct HarvestedForm {
    pub location: FormLocation,
    pub fields: BTreeMap<String, String>,
}

impl HarvestedForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

fn find_form<'a>(document: &'a Document, rule: &FormRule) -> Option<Node<'a>> {
    document.find(rule.clone()).next()
}

/// Find the first form satisfying `rule` and return where it submits to.
pub fn locate(html: &str, rule: &FormRule, context: &str) -> FederationResult<FormLocation> {
    let document = Document::from(html);
    let form = find_form(&document, rule).ok_or_else(|| FederationError::form_not_found(context))?;
    let action = form.attr("action").unwrap_or_default();
    FormLocation::from_action(action)
}

/// Find the first form satisfying `rule` and collect its named inputs. Every
/// name in `required` has to be present once the form has been scanned.
pub fn harvest(
    html: &str,
    rule: &FormRule,
    required: &[&str],
    context: &str,
) -> FederationResult<HarvestedForm> {
    let document = Document::from(html);
    let form = find_form(&document, rule).ok_or_else(|| FederationError::form_not_found(context))?;
    let location = FormLocation::from_action(form.attr("action").unwrap_or_default())?;

    let mut fields = BTreeMap::new();
    for input in form.find(Name("input")) {
        match (input.attr("name"), input.attr("value")) {
            (Some(name), Some(value)) if !name.is_empty() && !value.is_empty() => {
                fields.insert(name.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    if let Some(missing) = required.iter().find(|name| !fields.contains_key(**name)) {
        return Err(FederationError::missing_field(*missing));
    }

    debug!("{}: form posts to {} with {} fields", context, location.url, fields.len());
    Ok(HarvestedForm { location, fields })
}

/// Harvest the form the enterprise IdP returns after a successful login and
/// repair the signature material inside `wresult` before it is relayed.
pub fn harvest_idp_response(html: &str) -> FederationResult<HarvestedForm> {
    let mut form = harvest(
        html,
        &FormRule::absolute_action(),
        &IDP_RESPONSE_FIELDS,
        "IdP authentication response",
    )?;
    if let Some(wresult) = form.fields.get_mut("wresult") {
        *wresult = strip_signature_whitespace(wresult);
    }
    form.fields.insert("LoginOptions".to_string(), "1".to_string());
    Ok(form)
}

/// Harvest the broker form that carries the SAML Response.
pub fn harvest_broker_response(html: &str) -> FederationResult<HarvestedForm> {
    harvest_saml_response(html, "Broker authentication response")
}

/// Harvest any auto-submitting form that carries a SAML Response.
pub fn harvest_saml_response(html: &str, context: &str) -> FederationResult<HarvestedForm> {
    harvest(
        html,
        &FormRule::absolute_action(),
        &[SAML_RESPONSE_FIELD],
        context,
    )
}

/// Remove spaces from the bodies of the signature elements embedded in an
/// XML document. Elements are matched by local name, with or without prefix.
pub fn strip_signature_whitespace(xml: &str) -> String {
    SIGNED_ELEMENTS
        .iter()
        .fold(xml.to_string(), |acc, name| strip_element_spaces(&acc, name))
}

fn strip_element_spaces(xml: &str, local_name: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut rest = xml;

    while let Some(start) = rest.find('<') {
        let (text, tag) = rest.split_at(start);
        out.push_str(text);

        let Some(open_len) = tag.find('>').map(|i| i + 1) else {
            rest = tag;
            break;
        };
        let open_tag = &tag[..open_len];
        let after_open = &tag[open_len..];
        out.push_str(open_tag);
        rest = after_open;

        let Some(qname) = element_name(open_tag) else {
            continue;
        };
        if open_tag.ends_with("/>") || local_part(qname) != local_name {
            continue;
        }

        let close_tag = format!("</{}>", qname);
        if let Some(body_len) = after_open.find(&close_tag) {
            out.extend(after_open[..body_len].chars().filter(|c| *c != ' '));
            out.push_str(&close_tag);
            rest = &after_open[body_len + close_tag.len()..];
        }
    }

    out.push_str(rest);
    out
}

fn element_name(open_tag: &str) -> Option<&str> {
    let name = open_tag.strip_prefix('<')?;
    if name.starts_with(['/', '!', '?']) {
        return None;
    }
    let end = name
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(name.len());
    Some(&name[..end])
}

fn local_part(qname: &str) -> &str {
    qname.rsplit(':').next().unwrap_or(qname)
}
