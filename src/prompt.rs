//! User interaction.

use crate::error::{Error, Result};
use dialoguer::Confirm;

/// Asks a yes/no question; `skip` answers yes without asking.
pub trait Prompter {
    fn confirm(&self, skip: bool, prompt: String) -> Result<bool>;
}

pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, skip: bool, prompt: String) -> Result<bool> {
        if skip {
            return Ok(true);
        }
        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .map_err(|e| Error::ConfigError(e.to_string()))
    }
}
