//! Command registry.
//!
//! Commands are **not** namespaced: `/search` stays `/search` regardless of
//! which plugin registered it, so collisions across plugins are conflicts.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use cortex_core::{Command, CommandContext, CommandInfo, CommandResponse};

use crate::error::RegistryError;

/// A command plus the plugin that owns it.
#[derive(Clone)]
pub struct RegisteredCommand {
    pub plugin_id: String,
    pub command: Command,
}

/// Write-once registry of slash commands.
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, RegisteredCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, plugin_id: &str, command: Command) -> Result<(), RegistryError> {
        let name = command.info.name.clone();
        let mut commands = self.commands.write();
        if commands.contains_key(&name) {
            return Err(RegistryError::conflict("command", name));
        }
        debug!(command = %name, plugin = %plugin_id, "Command registered");
        commands.insert(
            name,
            RegisteredCommand {
                plugin_id: plugin_id.to_string(),
                command,
            },
        );
        Ok(())
    }

    /// Executes a command by name.
    pub async fn execute(
        &self,
        name: &str,
        args: Vec<String>,
        context: CommandContext,
    ) -> Result<CommandResponse, RegistryError> {
        let registered = self
            .commands
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::not_found("command", name))?;
        Ok((registered.command.handler)(args, context).await)
    }

    /// All registered commands with their owners, sorted by name.
    pub fn list(&self) -> Vec<(String, CommandInfo)> {
        let mut entries: Vec<(String, CommandInfo)> = self
            .commands
            .read()
            .values()
            .map(|r| (r.plugin_id.clone(), r.command.info.clone()))
            .collect();
        entries.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
