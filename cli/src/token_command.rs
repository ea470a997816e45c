//! Token source backed by an external shell command.
//!
//! The command's trimmed stdout is the bearer token (for example
//! `gcloud auth print-identity-token`). Output is cached until a caller asks
//! for a forced refresh, which re-runs the command. A failing command or an
//! empty output means "no token": the request goes out unauthenticated.

#[cfg(test)]
#[path = "token_command_test.rs"]
mod token_command_test;

use std::cell::RefCell;

use gatekeep::{AuthCallback, IdentityTokenSource, ProviderUser, Subscription, TokenError};

/// Subject reported for a command-backed identity.
pub const COMMAND_SUBJECT: &str = "token-command";

pub struct CommandTokenSource {
    command: String,
    cached: RefCell<Option<String>>,
}

impl CommandTokenSource {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), cached: RefCell::new(None) }
    }

    async fn run(&self) -> Result<String, TokenError> {
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .await
            .map_err(|e| TokenError::Provider(format!("failed to spawn token command: {e}")))?;

        if !output.status.success() {
            return Err(TokenError::Provider(format!("token command exited with {}", output.status)));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if token.is_empty() {
            return Err(TokenError::NoUser);
        }
        Ok(token)
    }
}

#[async_trait::async_trait(?Send)]
impl IdentityTokenSource for CommandTokenSource {
    fn current_user(&self) -> Option<ProviderUser> {
        self.cached.borrow().as_ref().map(|_| ProviderUser {
            uid: COMMAND_SUBJECT.to_owned(),
            ..ProviderUser::default()
        })
    }

    async fn get_token(&self, force_refresh: bool) -> Result<String, TokenError> {
        if !force_refresh {
            if let Some(token) = self.cached.borrow().clone() {
                return Ok(token);
            }
        }
        tracing::debug!(force_refresh, "running token command");
        match self.run().await {
            Ok(token) => {
                *self.cached.borrow_mut() = Some(token.clone());
                Ok(token)
            }
            Err(err) => {
                *self.cached.borrow_mut() = None;
                Err(err)
            }
        }
    }

    /// Commands have no push channel: report the current state once.
    fn on_auth_state_changed(&self, callback: AuthCallback) -> Subscription {
        callback(self.current_user());
        Subscription::noop()
    }
}
