use futures::future::BoxFuture;
use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::model::UserContext;

/// What a matched command receives.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    /// Named groups by name, unnamed groups by position ("1", "2", ...).
    /// Groups that did not participate in the match are absent.
    pub captures: HashMap<String, String>,
    pub message: String,
    pub connection_id: Uuid,
    pub user: UserContext,
}

impl CommandInvocation {
    pub fn capture(&self, key: &str) -> Option<&str> {
        self.captures.get(key).map(String::as_str)
    }
}

/// Async command body. The returned text, if any, is pushed back on the
/// connection the message arrived on.
pub trait CommandHandler: Send + Sync + 'static {
    fn call(&self, invocation: CommandInvocation) -> BoxFuture<'static, Option<String>>;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandInvocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<String>> + Send + 'static,
{
    fn call(&self, invocation: CommandInvocation) -> BoxFuture<'static, Option<String>> {
        Box::pin(self(invocation))
    }
}

struct Command {
    pattern: Regex,
    /// (group index, capture key) for every group after the whole match
    keys: Vec<(usize, String)>,
    handler: Arc<dyn CommandHandler>,
}

impl Command {
    fn new(pattern: &str, handler: Arc<dyn CommandHandler>) -> GatewayResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| {
            GatewayError::Schema(format!("Invalid command pattern '{}': {}", pattern, e))
        })?;
        let keys = pattern
            .capture_names()
            .enumerate()
            .skip(1)
            .map(|(index, name)| {
                let key = name.map(str::to_string).unwrap_or_else(|| index.to_string());
                (index, key)
            })
            .collect();
        Ok(Self {
            pattern,
            keys,
            handler,
        })
    }

    fn captures(&self, message: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(message)?;
        Some(
            self.keys
                .iter()
                .filter_map(|(index, key)| {
                    captures
                        .get(*index)
                        .map(|m| (key.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandDispatch {
    /// A command claimed the message; carries its optional reply
    Handled(Option<String>),
    Unrecognized,
}

/// Ordered list of message patterns. The first pattern that matches claims
/// the message, so overlapping patterns resolve by registration order.
#[derive(Default)]
pub struct CommandRouter {
    commands: Vec<Command>,
}

impl CommandRouter {
    pub fn builder() -> CommandRouterBuilder {
        CommandRouterBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub async fn dispatch(
        &self,
        message: &str,
        connection_id: Uuid,
        user: &UserContext,
    ) -> CommandDispatch {
        for command in &self.commands {
            if let Some(captures) = command.captures(message) {
                let invocation = CommandInvocation {
                    captures,
                    message: message.to_string(),
                    connection_id,
                    user: user.clone(),
                };
                return CommandDispatch::Handled(command.handler.call(invocation).await);
            }
        }

        log::debug!(
            "Unrecognized message on connection {}: {:.80}",
            connection_id,
            message
        );
        CommandDispatch::Unrecognized
    }
}

impl std::fmt::Debug for CommandRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.commands.iter().map(|c| c.pattern.as_str()))
            .finish()
    }
}

#[derive(Default)]
pub struct CommandRouterBuilder {
    commands: Vec<Command>,
}

impl CommandRouterBuilder {
    pub fn command<H: CommandHandler>(mut self, pattern: &str, handler: H) -> GatewayResult<Self> {
        self.commands.push(Command::new(pattern, Arc::new(handler))?);
        Ok(self)
    }

    pub fn build(self) -> CommandRouter {
        CommandRouter {
            commands: self.commands,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn reply(prefix: &'static str, invocation: CommandInvocation) -> Option<String> {
        let mut keys: Vec<_> = invocation
            .captures
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        keys.sort();
        Some(format!("{}:{}", prefix, keys.join(",")))
    }

    #[tokio::test]
    async fn test_first_registered_command_wins() {
        let router = CommandRouter::builder()
            .command(r"^ping (\w+)$", |inv: CommandInvocation| reply("first", inv))
            .unwrap()
            .command(r"^ping (?P<who>\w+)$", |inv: CommandInvocation| reply("second", inv))
            .unwrap()
            .build();

        let result = router
            .dispatch("ping bob", Uuid::new_v4(), &UserContext::anonymous())
            .await;
        assert_eq!(result, CommandDispatch::Handled(Some("first:1=bob".to_string())));
    }

    #[tokio::test]
    async fn test_named_and_positional_keys() {
        let router = CommandRouter::builder()
            .command(r"^(?P<verb>\w+) (\d+)(?: (x))?$", |inv: CommandInvocation| reply("cmd", inv))
            .unwrap()
            .build();

        let result = router
            .dispatch("move 42", Uuid::new_v4(), &UserContext::anonymous())
            .await;
        assert_eq!(
            result,
            CommandDispatch::Handled(Some("cmd:2=42,verb=move".to_string()))
        );
    }

    #[tokio::test]
    async fn test_unmatched_message_is_unrecognized() {
        let router = CommandRouter::builder()
            .command(r"^ping$", |_inv: CommandInvocation| async { None::<String> })
            .unwrap()
            .build();

        let result = router
            .dispatch("pong", Uuid::new_v4(), &UserContext::anonymous())
            .await;
        assert_eq!(result, CommandDispatch::Unrecognized);
        assert_eq!(
            router
                .dispatch("ping", Uuid::new_v4(), &UserContext::anonymous())
                .await,
            CommandDispatch::Handled(None)
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = CommandRouter::builder()
            .command(r"^(unclosed", |_inv: CommandInvocation| async { None::<String> });
        assert!(matches!(result, Err(GatewayError::Schema(_))));
    }
}
