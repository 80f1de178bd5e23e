use dialoguer::{Input, Password};

use super::error::{FederationError, FederationResult};
use crate::common::config::GetKeysConfig;

/// Asks the user for values the configuration left out
pub trait Prompter {
    fn input(&self, label: &str) -> FederationResult<String>;

    fn password(&self, label: &str) -> FederationResult<String>;
}

/// Prompts on the controlling terminal
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn input(&self, label: &str) -> FederationResult<String> {
        Input::<String>::new()
            .with_prompt(label)
            .interact_text()
            .map_err(|e| FederationError::input(e.to_string()))
    }

    fn password(&self, label: &str) -> FederationResult<String> {
        Password::new()
            .with_prompt(label)
            .interact()
            .map_err(|e| FederationError::input(e.to_string()))
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}

/// Fill in the application id, username and password when the chosen
/// identity source needs them and nothing supplied them.
pub fn fill_missing(prompter: &dyn Prompter, config: &mut GetKeysConfig) -> FederationResult<()> {
    if !is_blank(config.tenant_id()) && is_blank(config.application_id()) {
        let application_id = prompter.input("Application ID")?;
        config.broker_mut().application_id = Some(application_id);
    }

    if !config.identity()?.needs_login() {
        return Ok(());
    }
    if is_blank(config.username.as_deref()) {
        config.username = Some(prompter.input("Username")?);
    }
    if is_blank(config.password.as_deref()) {
        config.password = Some(prompter.password("Password")?);
    }
    Ok(())
}
