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

use config::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utility::{get_config, get_parameter};

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Config {
    // Configuration filename.
    pub filename: String,
    // Port of the TCP/IP server for the operator client.
    pub port_client: i32,
    // Polling time of the TCP/IP server in milliseconds.
    pub timeout_tcp: u64,
    // IP address of the programmable logic controller (PLC).
    pub plc_ip: String,
    // ISO-on-TCP port of the PLC.
    pub plc_port: u16,
    // Rack and slot of the CPU.
    pub plc_rack: u16,
    pub plc_slot: u16,
    // Timeouts of the PLC link in milliseconds.
    pub timeout_connect: u64,
    pub timeout_read: u64,
    pub timeout_write: u64,
    // Session scheduler loop time in milliseconds.
    pub loop_time: u64,
    // Number of disconnected ticks between two reconnect attempts.
    pub reconnect_ticks: u32,
    // Directory to save the finished test records.
    pub data_dir: String,
    // Local offset of the test date from UTC in hour.
    pub timezone_offset_hours: i8,
}

impl Config {
    /// Create a new config object.
    ///
    /// # Arguments
    /// * `filepath` - The path to the application parameters file.
    ///
    /// # Returns
    /// A new config object.
    pub fn new(filepath: &Path) -> Result<Self, ConfigError> {
        let config = get_config(filepath)?;

        Ok(Self {
            filename: filepath.to_string_lossy().to_string(),

            port_client: get_parameter(&config, "port_client")?,
            timeout_tcp: get_parameter(&config, "timeout_tcp")?,

            plc_ip: get_parameter(&config, "plc_ip")?,
            plc_port: get_parameter(&config, "plc_port")?,
            plc_rack: get_parameter(&config, "plc_rack")?,
            plc_slot: get_parameter(&config, "plc_slot")?,

            timeout_connect: get_parameter(&config, "timeout_connect")?,
            timeout_read: get_parameter(&config, "timeout_read")?,
            timeout_write: get_parameter(&config, "timeout_write")?,

            loop_time: get_parameter(&config, "loop_time")?,
            reconnect_ticks: get_parameter(&config, "reconnect_ticks")?,

            data_dir: get_parameter(&config, "data_dir")?,
            timezone_offset_hours: get_parameter(&config, "timezone_offset_hours")?,
        })
    }

    /// Timeouts of the PLC link.
    ///
    /// # Returns
    /// Timeouts of the connect, read, and write in milliseconds.
    pub fn plc_timeouts(&self) -> (u64, u64, u64) {
        (self.timeout_connect, self.timeout_read, self.timeout_write)
    }
}
