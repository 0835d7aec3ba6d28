// This file is part of ring_stiffness_controller.
//
// Developed for the pipe ring-stiffness test rig.
// See the COPYRIGHT file at the top-level directory of this distribution
// for details of code ownership.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use log::error;
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::command::command_service::CommandService;
use crate::enums::CommandStatus;
use crate::persistence::PendingMetadata;
use crate::publisher::Publisher;
use crate::telemetry::telemetry_service::TelemetryService;
use crate::utility::{acknowledge_command, get_message_name, get_message_sequence_id};

/// Services that the commands act on.
#[derive(Clone)]
pub struct CommandContext {
    // Command service.
    pub command: Arc<CommandService>,
    // Telemetry service.
    pub telemetry: Arc<TelemetryService>,
    // Operator metadata of the next test.
    pub metadata: Arc<Mutex<PendingMetadata>>,
    // Publisher to the subscribers.
    pub publisher: Arc<Publisher>,
}

pub trait Command {
    /// Get the name of the command.
    ///
    /// # Returns
    /// Command name.
    fn name(&self) -> &str;

    /// Execute the command.
    ///
    /// # Arguments
    /// * `message` - Command message to execute.
    /// * `context` - Services to execute the command.
    ///
    /// # Returns
    /// Result messages to reply if the execution succeeds. Otherwise, None.
    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>>;
}

pub struct CommandSchema {
    // List of commands.
    pub commands: Vec<Box<dyn Command + Send>>,
}

impl CommandSchema {
    /// Create a new command schema.
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Add a command to the schema.
    pub fn add_command(&mut self, command: Box<dyn Command + Send>) {
        self.commands.push(command);
    }

    /// Check if the command is in the schema.
    ///
    /// # Arguments
    /// * `name` - Command name that begins with "cmd_".
    ///
    /// # Returns
    /// True if the command is in the schema, false otherwise.
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.iter().any(|cmd| cmd.name() == name)
    }

    /// Execute a command.
    ///
    /// # Arguments
    /// * `message` - Command message to execute.
    /// * `context` - Services to execute the command.
    ///
    /// # Returns
    /// Acknowledgement of the command followed by the result messages.
    pub fn execute(&self, message: &Value, context: &CommandContext) -> Vec<Value> {
        let name = get_message_name(message);
        let sequence_id = get_message_sequence_id(message);

        for cmd in &self.commands {
            if cmd.name() == name {
                return match cmd.execute(message, context) {
                    Some(results) => {
                        let mut replies = vec![acknowledge_command(CommandStatus::Success, sequence_id)];
                        replies.extend(results);

                        replies
                    }
                    None => {
                        error!("Command execution failed: {message}");

                        vec![acknowledge_command(CommandStatus::Fail, sequence_id)]
                    }
                };
            }
        }

        error!("Unknown command: {message}");

        vec![acknowledge_command(CommandStatus::Fail, sequence_id)]
    }

    /// Get the number of commands.
    ///
    /// # Returns
    /// Number of commands.
    pub fn number_of_commands(&self) -> usize {
        self.commands.len()
    }
}

impl Default for CommandSchema {
    fn default() -> Self {
        Self::new()
    }
}
