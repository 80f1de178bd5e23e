use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{FederationError, FederationResult};
use crate::common::types::{Endpoints, IdentityProviderConfig};

/// Federation metadata published by the broker or the IdP
#[derive(Debug, Clone)]
pub struct FederationMetadata {
    pub url: String,
    pub cache_path: Option<PathBuf>,
    pub raw: String,
    pub from_cache: bool,
}

impl FederationMetadata {
    /// `entityID` of the root `EntityDescriptor`, if the document has one
    pub fn entity_id(&self) -> Option<String> {
        let mut reader = Reader::from_str(&self.raw);
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    if e.local_name().as_ref() != b"EntityDescriptor" {
                        return None;
                    }
                    return e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"entityID")
                        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()));
                }
                Ok(Event::Eof) | Err(_) => return None,
                Ok(_) => {}
            }
        }
    }
}

pub fn metadata_url(identity: &IdentityProviderConfig, endpoints: &Endpoints) -> Option<String> {
    match identity {
        IdentityProviderConfig::CloudBroker {
            tenant_id,
            application_id,
        } => Some(endpoints.broker_metadata(tenant_id, application_id)),
        IdentityProviderConfig::EnterpriseIdp { hostname } => Some(endpoints.idp_metadata(hostname)),
        IdentityProviderConfig::StaticAssertion { .. } => None,
    }
}

pub fn cache_file_name(identity: &IdentityProviderConfig) -> Option<String> {
    match identity {
        IdentityProviderConfig::CloudBroker {
            tenant_id,
            application_id,
        } => Some(format!("broker.{}.{}.metadata.xml", tenant_id, application_id)),
        IdentityProviderConfig::EnterpriseIdp { hostname } => {
            Some(format!("idp.{}.metadata.xml", hostname.replace(':', "_")))
        }
        IdentityProviderConfig::StaticAssertion { .. } => None,
    }
}

/// Read metadata from the cache directory, or fetch and cache it.
/// Static assertions need no metadata.
pub async fn load(
    http: &reqwest::Client,
    identity: &IdentityProviderConfig,
    endpoints: &Endpoints,
    cache_dir: Option<&Path>,
) -> FederationResult<Option<FederationMetadata>> {
    let Some(url) = metadata_url(identity, endpoints) else {
        debug!("Metadata not needed for {}", identity.kind());
        return Ok(None);
    };
    let cache_path = cache_dir
        .zip(cache_file_name(identity))
        .map(|(dir, name)| dir.join(name));

    if let Some(path) = cache_path.as_ref().filter(|p| p.exists()) {
        debug!("Metadata file exists: {}", path.display());
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| FederationError::io(path, e))?;
        return Ok(Some(FederationMetadata {
            url,
            cache_path,
            raw,
            from_cache: true,
        }));
    }

    info!("📥 Fetching federation metadata from {}", url);
    let raw = http
        .get(&url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    if let Some(path) = cache_path.as_ref() {
        tokio::fs::write(path, &raw)
            .await
            .map_err(|e| FederationError::io(path, e))?;
        debug!("Cached metadata at {}", path.display());
    }

    Ok(Some(FederationMetadata {
        url,
        cache_path,
        raw,
        from_cache: false,
    }))
}
