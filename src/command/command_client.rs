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

use log::{info, warn};
use serde::Serialize;
use serde_json::{json, Value};

use crate::command::command_schema::{Command, CommandContext, CommandSchema};
use crate::command::command_service::CommandService;
use crate::constants::DEFAULT_JOG_VELOCITY;
use crate::enums::JogDirection;
use crate::error::CommandError;
use crate::persistence::PendingMetadata;
use crate::telemetry::event::Event;
use crate::telemetry::parameters::ParameterUpdate;

/// Get the message with the "id" field and the serialized data.
///
/// # Arguments
/// * `id` - Message name.
/// * `data` - Data to serialize. It should be a struct.
///
/// # Returns
/// Message.
fn get_message<T: Serialize>(id: &str, data: &T) -> Value {
    let mut message = json!({"id": id});
    if let (Some(map), Ok(Value::Object(fields))) =
        (message.as_object_mut(), serde_json::to_value(data))
    {
        map.extend(fields);
    }

    message
}

/// Command without arguments that acts on the command service.
pub struct CommandAction {
    _name: &'static str,
    _action: fn(&CommandService) -> Result<(), CommandError>,
}

impl CommandAction {
    /// Create a new command action.
    ///
    /// # Arguments
    /// * `name` - Command name.
    /// * `action` - Action on the command service.
    ///
    /// # Returns
    /// New command action.
    pub fn new(name: &'static str, action: fn(&CommandService) -> Result<(), CommandError>) -> Self {
        Self {
            _name: name,
            _action: action,
        }
    }
}

impl Command for CommandAction {
    fn name(&self) -> &str {
        self._name
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        (self._action)(&context.command).ok()?;

        Some(Vec::new())
    }
}

/// Command to hold or release the jog.
pub struct CommandJog {
    _direction: JogDirection,
}

impl CommandJog {
    pub fn new(direction: JogDirection) -> Self {
        Self {
            _direction: direction,
        }
    }
}

impl Command for CommandJog {
    fn name(&self) -> &str {
        match self._direction {
            JogDirection::Forward => "cmd_jogForward",
            JogDirection::Backward => "cmd_jogBackward",
        }
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let state = message["state"].as_bool()?;

        let result = context.command.jog(self._direction, state);
        if let Some(reason) = result.reason {
            context
                .publisher
                .publish_event(Event::get_message_jog_rejected(self._direction, reason));
        }

        Some(vec![json!({
            "id": "jogResponse",
            "direction": self._direction,
            "state": state,
            "success": result.success,
            "reason": result.reason,
            "message": result.message,
        })])
    }
}

/// Command to set the jog velocity.
pub struct CommandSetJogVelocity;
impl Command for CommandSetJogVelocity {
    fn name(&self) -> &str {
        "cmd_setJogVelocity"
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let velocity = message["velocity"].as_f64().unwrap_or(DEFAULT_JOG_VELOCITY);

        context
            .command
            .set_jog_velocity(velocity)
            .then(Vec::new)
    }
}

/// Command to release both jog directions.
pub struct CommandStopAllJog;
impl Command for CommandStopAllJog {
    fn name(&self) -> &str {
        "cmd_stopAllJog"
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        context.command.stop_all_jog();

        Some(Vec::new())
    }
}

/// Command to set the step distance.
pub struct CommandSetStepDistance;
impl Command for CommandSetStepDistance {
    fn name(&self) -> &str {
        "cmd_setStepDistance"
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let distance = message["distance"].as_f64()?;
        context.command.set_step_distance(distance).ok()?;

        Some(Vec::new())
    }
}

/// Command to switch between the remote and local modes.
pub struct CommandSetMode;
impl Command for CommandSetMode {
    fn name(&self) -> &str {
        "cmd_setMode"
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let remote = message["remote"].as_bool()?;
        if let Err(error) = context.command.set_mode(remote) {
            info!("Failed to set the remote mode to {remote}: {error}.");
            return None;
        }

        Some(Vec::new())
    }
}

/// Command to get the mode.
pub struct CommandGetMode;
impl Command for CommandGetMode {
    fn name(&self) -> &str {
        "cmd_getMode"
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let (remote, can_change) = context.command.get_mode().ok()?;

        Some(vec![json!({
            "id": "mode",
            "remote": remote,
            "can_change": can_change,
        })])
    }
}

/// Command to get the test parameters.
pub struct CommandGetParameters;
impl Command for CommandGetParameters {
    fn name(&self) -> &str {
        "cmd_getParameters"
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let parameters = context.telemetry.get_parameters();

        Some(vec![get_message("parameters", &parameters)])
    }
}

/// Command to write the test parameters. Each requested field is written
/// independently and the report lists the failed ones.
pub struct CommandSetParameters;
impl Command for CommandSetParameters {
    fn name(&self) -> &str {
        "cmd_setParameters"
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let update: ParameterUpdate = serde_json::from_value(message.clone()).ok()?;
        if update.is_empty() {
            return None;
        }

        let report = context.telemetry.set_parameters(&update).ok()?;
        if !report.is_complete() {
            warn!("Failed to write the parameters: {:?}.", report.failed);
        }

        Some(vec![get_message("parametersWritten", &report)])
    }
}

/// Command to set the operator metadata of the next test.
pub struct CommandSetTestMetadata;
impl Command for CommandSetTestMetadata {
    fn name(&self) -> &str {
        "cmd_setTestMetadata"
    }

    fn execute(&self, message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let metadata: PendingMetadata = serde_json::from_value(message.clone()).ok()?;

        *context
            .metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = metadata;

        Some(Vec::new())
    }
}

/// Command to get the operator metadata of the next test.
pub struct CommandGetTestMetadata;
impl Command for CommandGetTestMetadata {
    fn name(&self) -> &str {
        "cmd_getTestMetadata"
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let metadata = context
            .metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        Some(vec![get_message("testMetadata", &metadata)])
    }
}

/// Command to get the results of the last test.
pub struct CommandGetTestResults;
impl Command for CommandGetTestResults {
    fn name(&self) -> &str {
        "cmd_getTestResults"
    }

    fn execute(&self, _message: &Value, context: &CommandContext) -> Option<Vec<Value>> {
        let results = context.telemetry.get_test_results();

        Some(vec![get_message("testResults", &results)])
    }
}

/// Create the command schema of the operator client.
///
/// # Returns
/// Command schema with all the commands.
pub fn create_command_schema() -> CommandSchema {
    let mut schema = CommandSchema::new();

    schema.add_command(Box::new(CommandJog::new(JogDirection::Forward)));
    schema.add_command(Box::new(CommandJog::new(JogDirection::Backward)));
    schema.add_command(Box::new(CommandSetJogVelocity));
    schema.add_command(Box::new(CommandStopAllJog));

    schema.add_command(Box::new(CommandSetStepDistance));
    schema.add_command(Box::new(CommandAction::new("cmd_stepForward", |service| {
        service.step(JogDirection::Forward)
    })));
    schema.add_command(Box::new(CommandAction::new("cmd_stepBackward", |service| {
        service.step(JogDirection::Backward)
    })));

    schema.add_command(Box::new(CommandAction::new("cmd_start", CommandService::start_test)));
    schema.add_command(Box::new(CommandAction::new("cmd_stop", CommandService::stop_test)));
    schema.add_command(Box::new(CommandAction::new("cmd_home", CommandService::home)));
    schema.add_command(Box::new(CommandAction::new("cmd_tare", CommandService::tare)));
    schema.add_command(Box::new(CommandAction::new(
        "cmd_zeroPosition",
        CommandService::zero_position,
    )));

    schema.add_command(Box::new(CommandAction::new("cmd_servoEnable", |service| {
        service.enable_servo(true)
    })));
    schema.add_command(Box::new(CommandAction::new("cmd_servoDisable", |service| {
        service.enable_servo(false)
    })));
    schema.add_command(Box::new(CommandAction::new(
        "cmd_servoReset",
        CommandService::reset_servo,
    )));

    schema.add_command(Box::new(CommandAction::new(
        "cmd_lockUpperClamp",
        CommandService::lock_upper_clamp,
    )));
    schema.add_command(Box::new(CommandAction::new(
        "cmd_lockLowerClamp",
        CommandService::lock_lower_clamp,
    )));
    schema.add_command(Box::new(CommandAction::new(
        "cmd_unlockClamps",
        CommandService::unlock_clamps,
    )));

    schema.add_command(Box::new(CommandSetMode));
    schema.add_command(Box::new(CommandGetMode));

    schema.add_command(Box::new(CommandGetParameters));
    schema.add_command(Box::new(CommandSetParameters));
    schema.add_command(Box::new(CommandSetTestMetadata));
    schema.add_command(Box::new(CommandGetTestMetadata));
    schema.add_command(Box::new(CommandGetTestResults));

    schema
}
