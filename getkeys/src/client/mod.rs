use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::commands::LoginCommand;
use crate::common::config::{
    self, GetKeysConfig, IdpConfig, RoleConfig, StaticAssertionConfig,
};
use crate::common::types::{Endpoints, IdentityProviderConfig};
use persist::{expand_home, CredentialSink, CredentialsFileSink, EnvFileSink, ShellStyle};
use prompt::TerminalPrompter;
use session::{AuthSession, SessionConfig};

pub mod authn_request;
pub mod credentials;
pub mod error;
pub mod forms;
pub mod metadata;
pub mod persist;
pub mod prompt;
pub mod saml_response;
pub mod session;
pub mod sts_response;

pub async fn run(args: LoginCommand) -> Result<()> {
    let config_path = config::locate_config(args.config.as_deref())?;
    let mut settings = match &config_path {
        Some(path) => {
            info!("📄 Using configuration from {}", path.display());
            GetKeysConfig::load(path)?
        }
        None => {
            info!("📄 No configuration file found, using command line settings");
            GetKeysConfig::default()
        }
    };
    apply_overrides(&args, &mut settings);

    if !args.no_prompt {
        prompt::fill_missing(&TerminalPrompter, &mut settings)?;
    }

    let identity = match settings.identity()? {
        IdentityProviderConfig::StaticAssertion { file } => IdentityProviderConfig::StaticAssertion {
            file: expand_home(&file.to_string_lossy()),
        },
        other => other,
    };
    let roles = settings.requested_roles()?;

    let mut endpoints = Endpoints::default();
    if let Some(base) = &args.broker_base {
        endpoints.broker_base = base.clone();
    }
    if let Some(url) = &args.token_exchange_url {
        endpoints.token_exchange_url = url.clone();
    }

    println!("🎯 Login Configuration:");
    println!("   🪪 Identity source: {}", identity.kind());
    if let Some(username) = &settings.username {
        println!("   👤 Username:        {}", username);
    }
    for role in &roles {
        println!(
            "   🎭 Role:            {} on {} as {}",
            role.role_name, role.account_id, role.profile_name
        );
    }
    println!();

    let mut session = AuthSession::new(SessionConfig {
        identity,
        roles,
        username: settings.username.clone(),
        password: settings.password.clone(),
        metadata_dir: config::metadata_dir(config_path.as_deref()),
        endpoints,
    })?;
    let records = session.run().await?;
    if records.is_empty() {
        bail!("No credentials were obtained for any requested role");
    }

    let mut sinks: Vec<Box<dyn CredentialSink>> = vec![Box::new(CredentialsFileSink::new(
        expand_home(&args.credentials_file),
    ))];
    if let Some(env_file) = &args.env_file {
        sinks.push(Box::new(EnvFileSink::new(
            expand_home(env_file),
            ShellStyle::native(),
        )));
    }
    for sink in &sinks {
        sink.store(&records)
            .await
            .with_context(|| format!("Failed to write {}", sink.describe()))?;
    }

    println!("✅ Obtained credentials for {} profile(s)", records.len());
    for record in &records {
        if record.is_expired(Utc::now()) {
            warn!("⚠️ Credentials for {} are already expired", record.profile_name);
        }
        match record.expiration {
            Some(expiration) => println!("   🔑 {} (expires {})", record.profile_name, expiration),
            None => println!("   🔑 {}", record.profile_name),
        }
    }
    Ok(())
}

/// Command line values win over the file. Naming an identity source on the
/// command line replaces the file's sources.
fn apply_overrides(args: &LoginCommand, settings: &mut GetKeysConfig) {
    if let Some(username) = &args.username {
        settings.username = Some(username.clone());
    }
    if let Some(password) = &args.password {
        settings.password = Some(password.clone());
    }

    if args.tenant_id.is_some() || args.idp_hostname.is_some() || args.static_file.is_some() {
        if args.tenant_id.is_none() {
            settings.broker = None;
        }
        settings.idp = None;
        settings.static_assertion = None;
    }
    if let Some(tenant_id) = &args.tenant_id {
        settings.broker_mut().tenant_id = Some(tenant_id.clone());
    }
    if let Some(application_id) = &args.application_id {
        settings.broker_mut().application_id = Some(application_id.clone());
    }
    if let Some(hostname) = &args.idp_hostname {
        settings.idp = Some(IdpConfig {
            hostname: hostname.clone(),
        });
    }
    if let Some(file) = &args.static_file {
        settings.static_assertion = Some(StaticAssertionConfig { file: file.clone() });
    }

    match (&args.account_id, &args.role) {
        (Some(account_id), Some(role)) => {
            settings.roles = vec![RoleConfig {
                account_id: account_id.clone(),
                role: role.clone(),
                region: args.region.clone(),
                profile_name: args.profile_name.clone(),
            }];
        }
        _ => {
            if let Some(region) = &args.region {
                for role in settings.roles.iter_mut().filter(|r| r.region.is_none()) {
                    role.region = Some(region.clone());
                }
            }
            if args.profile_name.is_some() {
                warn!("⚠️ --profile-name is ignored without --account-id and --role");
            }
        }
    }
}
