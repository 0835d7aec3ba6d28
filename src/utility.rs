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

use config::{Config, ConfigError};
use serde_json::{json, Value};
use std::path::Path;

#[cfg(test)]
use std::io::{Read, Write};
#[cfg(test)]
use std::net::TcpStream;
#[cfg(test)]
use std::thread::sleep;
#[cfg(test)]
use std::time::Duration;

use crate::enums::CommandStatus;

/// Trait for parsing the configuration value.
///
/// # Parameters
/// * `Self` - Type of the configuration value.
pub trait ConfigValue: Sized {
    /// Parse the configuration value.
    ///
    /// # Parameters
    /// * `s` - String to parse.
    ///
    /// # Returns
    /// The parsed configuration value if the string is valid.
    fn parse_value(s: &str) -> Option<Self>;
}

impl ConfigValue for String {
    fn parse_value(s: &str) -> Option<Self> {
        Some(s.to_string())
    }
}

impl ConfigValue for f64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<f64>().ok()
    }
}

impl ConfigValue for u64 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u64>().ok()
    }
}

impl ConfigValue for u32 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u32>().ok()
    }
}

impl ConfigValue for u16 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<u16>().ok()
    }
}

impl ConfigValue for i32 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<i32>().ok()
    }
}

impl ConfigValue for i8 {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<i8>().ok()
    }
}

impl ConfigValue for bool {
    fn parse_value(s: &str) -> Option<Self> {
        s.parse::<bool>().ok()
    }
}

/// Get the configuation from the file.
///
/// # Parameters
/// * `filepath` - Path to the config file.
///
/// # Returns
/// The configuration.
pub fn get_config(filepath: &Path) -> Result<Config, ConfigError> {
    Config::builder()
        .add_source(config::File::from(filepath))
        .build()
}

/// Get the parameter from the configuration.
///
/// # Parameters
/// * `config` - Configuration.
/// * `key` - Key to find the parameter in the configuration.
///
/// # Returns
/// The parameter.
pub fn get_parameter<T: ConfigValue>(config: &Config, key: &str) -> Result<T, ConfigError> {
    let value = config.get_string(key)?;

    T::parse_value(&value)
        .ok_or_else(|| ConfigError::Message(format!("Failed to parse the {key}: {value}")))
}

/// Check if the message is a command.
///
/// # Arguments
/// * `name` - Name of the message.
///
/// # Returns
/// True if the message is a command, false otherwise.
pub fn is_command(name: &str) -> bool {
    name.starts_with("cmd_")
}

/// Acknowledge the command.
///
/// # Arguments
/// * `command_status` - Command status.
/// * `sequence_id` - Sequence ID.
///
/// # Returns
/// Acknowledged command.
pub fn acknowledge_command(command_status: CommandStatus, sequence_id: i64) -> Value {
    json!({"id": command_status.as_ref().to_lowercase(), "sequence_id": sequence_id})
}

/// Get the message name.
///
/// # Arguments
/// * `message` - Message that should have the "id" field.
///
/// # Returns
/// Message name. Return an empty string if the name is not found.
pub fn get_message_name(message: &Value) -> String {
    match message["id"].as_str() {
        Some(id) => String::from(id),
        None => String::new(),
    }
}

/// Get the message sequence ID.
///
/// # Arguments
/// * `message` - Message.
///
/// # Returns
/// Message sequence ID. Return -1 if the sequence ID is not found.
pub fn get_message_sequence_id(message: &Value) -> i64 {
    match message["sequence_id"].as_i64() {
        Some(sequence_id) => sequence_id,
        None => -1,
    }
}

/// TCP/IP client writes the message and sleep.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `message` - Message to write.
/// * `sleep_time` - Sleep time in milliseconds.
///
/// # Panics
/// If the TCP stream of the client cannot write or flush.
#[cfg(test)]
pub fn client_write_and_sleep(client: &mut TcpStream, message: &str, sleep_time: u64) {
    client
        .write_all(message.as_bytes())
        .expect("Tcp stream should write.");
    client.flush().expect("Tcp stream should flush.");

    sleep(Duration::from_millis(sleep_time));
}

/// TCP/IP client reads the message and assert.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `expected` - Expected message.
///
/// # Panics
/// If the TCP stream of the client cannot read.
#[cfg(test)]
pub fn client_read_and_assert(client: &mut TcpStream, expected: &str) {
    let mut buffer = vec![0; expected.len()];
    client
        .read_exact(&mut buffer)
        .expect("Tcp stream of the client should read.");

    assert_eq!(String::from_utf8_lossy(&buffer), expected);
}

/// TCP/IP client reads the JSON message.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `terminator` - Terminator of the message.
///
/// # Returns
/// JSON message.
#[cfg(test)]
pub fn client_read_json(client: &mut TcpStream, terminator: &[u8]) -> Value {
    let mut buffer = Vec::new();
    loop {
        let mut byte = [0; 1];
        client
            .read_exact(&mut byte)
            .expect("Tcp stream of the client should read.");

        buffer.push(byte[0]);
        if buffer.ends_with(terminator) {
            break;
        }
    }

    serde_json::from_slice(&buffer[0..(buffer.len() - terminator.len())])
        .expect("Should be able to convert to JSON.")
}

/// TCP/IP client reads the specific JSON message.
///
/// # Arguments
/// * `client` - TCP/IP client.
/// * `terminator` - Terminator of the message.
/// * `name` - Name of the message.
///
/// # Returns
/// JSON message.
#[cfg(test)]
pub fn client_read_specific_json(client: &mut TcpStream, terminator: &[u8], name: &str) -> Value {
    loop {
        let message = client_read_json(client, terminator);
        if get_message_name(&message) == name {
            return message;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_config() -> Config {
        get_config(Path::new("config/parameters_app.yaml")).unwrap()
    }

    #[test]
    fn test_get_config() {
        let port = create_config().get_int("port_client").unwrap();

        assert_eq!(port, 50010);
    }

    #[test]
    fn test_get_config_error() {
        assert!(get_config(Path::new("wrong.yaml")).is_err());
    }

    #[test]
    fn test_get_parameter() {
        let config = create_config();

        let plc_ip: String = get_parameter(&config, "plc_ip").unwrap();
        assert_eq!(plc_ip, "192.168.0.1");

        let reconnect_ticks: u32 = get_parameter(&config, "reconnect_ticks").unwrap();
        assert_eq!(reconnect_ticks, 50);

        let timezone_offset_hours: i8 = get_parameter(&config, "timezone_offset_hours").unwrap();
        assert_eq!(timezone_offset_hours, 3);
    }

    #[test]
    fn test_get_parameter_error() {
        let config = create_config();

        // Not found.
        assert!(get_parameter::<f64>(&config, "wrong").is_err());

        // Not parsable.
        assert!(get_parameter::<u16>(&config, "plc_ip").is_err());
    }

    #[test]
    fn test_is_command() {
        assert!(is_command("cmd_start"));
        assert!(!is_command("liveData"));
        assert!(!is_command("start"));
    }

    #[test]
    fn test_acknowledge_command() {
        assert_eq!(
            acknowledge_command(CommandStatus::Success, 1),
            json!({"id": "success", "sequence_id": 1})
        );
        assert_eq!(
            acknowledge_command(CommandStatus::Fail, 2),
            json!({"id": "fail", "sequence_id": 2})
        );
        assert_eq!(
            acknowledge_command(CommandStatus::Ack, 3),
            json!({"id": "ack", "sequence_id": 3})
        );
        assert_eq!(
            acknowledge_command(CommandStatus::NoAck, 4),
            json!({"id": "noack", "sequence_id": 4})
        );
    }

    #[test]
    fn test_get_message_name() {
        // There is the "id" field.
        assert_eq!(get_message_name(&json!({"id": "cmd_start"})), "cmd_start");
        assert_eq!(get_message_name(&json!({"id": 1})), "");

        // There is no "id" field.
        assert_eq!(get_message_name(&json!({})), "");
    }

    #[test]
    fn test_get_message_sequence_id() {
        assert_eq!(get_message_sequence_id(&json!({"sequence_id": 1})), 1);
        assert_eq!(get_message_sequence_id(&json!({"sequence_id": 1.0})), -1);
        assert_eq!(get_message_sequence_id(&json!({})), -1);
    }
}
