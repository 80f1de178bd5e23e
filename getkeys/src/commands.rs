use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
pub struct LoginCommand {
    /// Configuration file (defaults to ./getkeys.yaml, ./config/getkeys.yaml, ~/.aws/getkeys.yaml)
    #[arg(short, long, env = "GETKEYS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Username, an email address when signing in through the broker
    #[arg(short, long, env = "GETKEYS_USERNAME")]
    pub username: Option<String>,

    /// Password
    #[arg(short, long, env = "GETKEYS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Cloud identity broker tenant ID
    #[arg(long, env = "GETKEYS_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Cloud identity broker application ID
    #[arg(long, env = "GETKEYS_APPLICATION_ID")]
    pub application_id: Option<String>,

    /// Enterprise IdP hostname, to sign in without the broker
    #[arg(long, env = "GETKEYS_IDP_HOSTNAME")]
    pub idp_hostname: Option<String>,

    /// File holding a previously captured SAML Response
    #[arg(long, env = "GETKEYS_STATIC_FILE")]
    pub static_file: Option<String>,

    /// Account ID of the role to assume (replaces the configured roles)
    #[arg(long, requires = "role")]
    pub account_id: Option<String>,

    /// Name of the role to assume
    #[arg(long, requires = "account_id")]
    pub role: Option<String>,

    /// Default region written with the credentials
    #[arg(long)]
    pub region: Option<String>,

    /// Profile name for the credentials
    #[arg(long)]
    pub profile_name: Option<String>,

    /// Credentials file to merge the profiles into
    #[arg(long, default_value = "~/.aws/credentials")]
    pub credentials_file: String,

    /// Also export the first profile as shell environment assignments
    #[arg(long)]
    pub env_file: Option<String>,

    /// Fail instead of prompting for missing values
    #[arg(long)]
    pub no_prompt: bool,

    /// Broker login base URL
    #[arg(long, hide = true, env = "GETKEYS_BROKER_BASE")]
    pub broker_base: Option<String>,

    /// Token exchange endpoint
    #[arg(long, hide = true, env = "GETKEYS_TOKEN_EXCHANGE_URL")]
    pub token_exchange_url: Option<String>,
}
