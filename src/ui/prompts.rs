//! Confirmation prompts

use super::context::UiContext;
use crate::error::{ClientError, ClientResult};

/// Ask for confirmation
///
/// `--yes` approves, a non-interactive session gets `default`.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> ClientResult<bool> {
    if ctx.auto_yes() {
        return Ok(true);
    }
    if !ctx.is_interactive() {
        return Ok(default);
    }

    // cliclack blocks on stdin
    let message = message.to_string();
    tokio::task::spawn_blocking(move || {
        cliclack::confirm(&message)
            .initial_value(default)
            .interact()
    })
    .await
    .map_err(|e| ClientError::Prompt(format!("Prompt task failed: {}", e)))?
    .map_err(|e| ClientError::Prompt(format!("Prompt failed: {}", e)))
}
