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

use log::info;
use std::thread::sleep;
use std::time::Duration;

use crate::command::command_schema::{CommandContext, CommandSchema};
use crate::enums::CommandStatus;
use crate::interface::tcp_server::TcpServer;
use crate::publisher::Subscription;
use crate::telemetry::event::Event;
use crate::utility::{acknowledge_command, get_message_name, get_message_sequence_id, is_command};

/// Server of the operator client. It forwards the commands to the command
/// schema and pushes the published messages to the client.
pub struct ClientServer {
    // Command schema.
    _schema: CommandSchema,
    // Services to execute the commands.
    _context: CommandContext,
    // Subscription of the connected client.
    _subscription: Option<Subscription>,
    // Last sequence ID.
    _last_sequence_id: i64,
}

impl ClientServer {
    /// Create a new client server.
    ///
    /// # Arguments
    /// * `schema` - Command schema.
    /// * `context` - Services to execute the commands.
    ///
    /// # Returns
    /// Client server.
    pub fn new(schema: CommandSchema, context: CommandContext) -> Self {
        Self {
            _schema: schema,
            _context: context,
            _subscription: None,
            _last_sequence_id: -1,
        }
    }

    /// Reset the sequence ID.
    pub fn reset_sequence_id(&mut self) {
        self._last_sequence_id = -1;
    }

    /// Check the sequence ID.
    ///
    /// # Arguments
    /// * `sequence_id` - Sequence ID, which should be >= 0.
    ///
    /// # Returns
    /// Lost sequence IDs.
    pub fn check_sequence_id(&mut self, sequence_id: i64) -> Vec<i64> {
        if self._last_sequence_id == -1 {
            self._last_sequence_id = sequence_id;
            return Vec::new();
        }

        let expected_sequence_id = self._last_sequence_id + 1;
        let lost_sequence_ids = if sequence_id > expected_sequence_id {
            (expected_sequence_id..sequence_id).collect()
        } else {
            Vec::new()
        };

        self._last_sequence_id = sequence_id;

        lost_sequence_ids
    }

    /// Process the command from the client and push the published messages.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `client_server` - Client server.
    pub fn process_command(tcp_server: &mut TcpServer, client_server: &mut ClientServer) {
        let mut is_processed = false;

        let message_received = tcp_server.read_json();
        if !message_received.is_null() {
            let name = get_message_name(&message_received);
            let sequence_id = get_message_sequence_id(&message_received);

            if is_command(&name) && client_server._schema.has_command(&name) {
                // For the lost sequence IDs, send a NoAck.
                for lost_sequence_id in client_server.check_sequence_id(sequence_id) {
                    tcp_server.write_json(&acknowledge_command(
                        CommandStatus::NoAck,
                        lost_sequence_id,
                    ));
                }

                tcp_server.write_json(&acknowledge_command(CommandStatus::Ack, sequence_id));

                for reply in client_server
                    ._schema
                    .execute(&message_received, &client_server._context)
                {
                    tcp_server.write_json(&reply);
                }
            } else {
                info!("Invalid command message: {message_received}.");
                tcp_server.write_json(&acknowledge_command(CommandStatus::NoAck, sequence_id));
            }

            is_processed = true;
        }

        if let Some(subscription) = client_server._subscription.as_ref() {
            let mut messages = subscription.take_events();
            let number_events = messages.len();
            if let Some(latest) = subscription.take_latest() {
                messages.push(latest);
            }

            // Nothing new still flushes the pending data.
            let number_written = tcp_server.write_jsons(&messages);

            // Undelivered events wait for the next round. The live data is
            // replaced by a newer one anyway.
            if number_written < number_events {
                subscription
                    .restore_events(messages.drain(number_written..number_events).collect());
            }

            if number_written > 0 {
                is_processed = true;
            }
        }

        // Sleep for a while to avoid busy waiting.
        if !is_processed {
            sleep(Duration::from_millis(tcp_server.timeout));
        }
    }

    /// Process the first connection of a client.
    ///
    /// # Arguments
    /// * `tcp_server` - TCP server.
    /// * `client_server` - Client server.
    pub fn process_first_connection(tcp_server: &mut TcpServer, client_server: &mut ClientServer) {
        client_server.reset_sequence_id();
        client_server._subscription = Some(client_server._context.publisher.subscribe());

        let is_connected = client_server._context.command.link().is_connected();
        tcp_server.write_json(&Event::get_message_connection_status(is_connected));
    }

    /// Process the disconnection of the client. No jog survives the client.
    ///
    /// # Arguments
    /// * `_tcp_server` - TCP server.
    /// * `client_server` - Client server.
    pub fn process_disconnection(_tcp_server: &mut TcpServer, client_server: &mut ClientServer) {
        info!("Operator client is disconnected. Stop the jog.");

        client_server._subscription = None;
        client_server._context.command.stop_all_jog();
    }
}
