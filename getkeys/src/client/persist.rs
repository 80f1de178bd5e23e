use async_trait::async_trait;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::credentials::CredentialRecord;
use super::error::{FederationError, FederationResult};

/// Somewhere credential records end up once the exchange is done
#[async_trait]
pub trait CredentialSink: Send + Sync {
    async fn store(&self, records: &[CredentialRecord]) -> FederationResult<()>;

    fn describe(&self) -> String;
}

/// Profile-sectioned credentials file, merged one profile at a time
pub struct CredentialsFileSink {
    path: PathBuf,
}

impl CredentialsFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CredentialSink for CredentialsFileSink {
    async fn store(&self, records: &[CredentialRecord]) -> FederationResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} does not exist yet", self.path.display());
                String::new()
            }
            Err(e) => return Err(FederationError::io(&self.path, e)),
        };

        write_private(&self.path, &merge_profiles(&existing, records)).await?;
        for record in records {
            info!(
                "💾 Stored profile {} in {}",
                record.profile_name,
                self.path.display()
            );
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("credentials file {}", self.path.display())
    }
}

/// Which shell the environment file is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellStyle {
    Posix,
    Windows,
}

impl ShellStyle {
    pub fn native() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }
}

/// Environment export file. Only one set of credentials fits in it.
pub struct EnvFileSink {
    path: PathBuf,
    style: ShellStyle,
}

impl EnvFileSink {
    pub fn new(path: impl Into<PathBuf>, style: ShellStyle) -> Self {
        Self {
            path: path.into(),
            style,
        }
    }
}

#[async_trait]
impl CredentialSink for EnvFileSink {
    async fn store(&self, records: &[CredentialRecord]) -> FederationResult<()> {
        let Some(record) = records.first() else {
            return Ok(());
        };
        if records.len() > 1 {
            warn!(
                "⚠️ {} holds one profile, only {} is exported",
                self.path.display(),
                record.profile_name
            );
        }

        write_private(&self.path, &render_env(record, self.style)).await?;
        info!(
            "💾 Exported profile {} to {}",
            record.profile_name,
            self.path.display()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("environment file {}", self.path.display())
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path {
        "~" => Some(""),
        _ => path.strip_prefix("~/"),
    };
    match (rest, dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Drop every section named after one of `records`, keep the rest as it
/// was, then append one section per record.
pub fn merge_profiles(existing: &str, records: &[CredentialRecord]) -> String {
    let replaced: HashSet<&str> = records.iter().map(|r| r.profile_name.as_str()).collect();

    let mut kept = String::with_capacity(existing.len());
    let mut skipping = false;
    for line in existing.lines() {
        if let Some(name) = section_name(line) {
            skipping = replaced.contains(name);
        }
        if !skipping {
            kept.push_str(line);
            kept.push('\n');
        }
    }

    let mut merged = kept.trim_matches(['\n', '\r']).to_string();
    for record in records {
        if !merged.is_empty() {
            merged.push_str("\n\n");
        }
        merged.push_str(render_profile(record).trim_end());
    }
    merged.push('\n');
    merged
}

pub fn render_profile(record: &CredentialRecord) -> String {
    let mut section = format!(
        "[{}]\n# Assumed Role ID: {}\n# Assumed Role ARN: {}\n",
        record.profile_name, record.assumed_role_id, record.assumed_role_arn
    );
    if let Some(expiration) = record.expiration {
        section.push_str(&format!("# Expires: {}\n", expiration.to_rfc3339()));
    }
    section.push_str(&format!(
        "region={}\naws_access_key_id={}\naws_secret_access_key={}\naws_session_token={}\n",
        record.default_region, record.access_key_id, record.secret_access_key, record.session_token
    ));
    section
}

pub fn render_env(record: &CredentialRecord, style: ShellStyle) -> String {
    let comment = match style {
        ShellStyle::Posix => "#",
        ShellStyle::Windows => "REM",
    };
    let assign = |name: &str, value: &str| match style {
        ShellStyle::Posix => format!("export {}={}", name, value),
        ShellStyle::Windows => format!("SETX {} {}", name, value),
    };

    [
        format!("{} Assumed Role ID: {}", comment, record.assumed_role_id),
        format!("{} Assumed Role ARN: {}", comment, record.assumed_role_arn),
        assign("AWS_DEFAULT_REGION", &record.default_region),
        assign("AWS_ACCESS_KEY_ID", &record.access_key_id),
        assign("AWS_SECRET_ACCESS_KEY", &record.secret_access_key),
        assign("AWS_SESSION_TOKEN", &record.session_token),
    ]
    .join("\n")
        + "\n"
}

fn section_name(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix('[')?
        .strip_suffix(']')
        .map(str::trim)
}

async fn write_private(path: &Path, content: &str) -> FederationResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FederationError::io(parent, e))?;
    }

    let mut file = private_options()
        .open(path)
        .await
        .map_err(|e| FederationError::io(path, e))?;
    // mode only applies to new files
    restrict_permissions(path).await?;
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| FederationError::io(path, e))?;
    file.flush().await.map_err(|e| FederationError::io(path, e))
}

fn private_options() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> FederationResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| FederationError::io(path, e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> FederationResult<()> {
    Ok(())
}
