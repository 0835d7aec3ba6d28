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

use crate::enums::CpuState;

/// Connection state of the session. Only the session scheduler writes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    // Connected at the last tick or not.
    pub connected: bool,
    // Disconnected ticks since the last reconnect attempt.
    pub reconnect_counter: u32,
    // Last observed run state of the CPU.
    pub last_run_state: CpuState,
}

impl ConnectionState {
    /// Create a new disconnected state.
    pub fn new() -> Self {
        Self {
            connected: false,
            reconnect_counter: 0,
            last_run_state: CpuState::Unknown,
        }
    }

    /// Count one disconnected tick.
    ///
    /// # Arguments
    /// * `threshold` - Number of the ticks between the reconnect attempts.
    ///
    /// # Returns
    /// True if it is time to reconnect. The counter is reset then.
    pub fn count_reconnect(&mut self, threshold: u32) -> bool {
        self.reconnect_counter += 1;
        if self.reconnect_counter >= threshold {
            self.reconnect_counter = 0;
            return true;
        }

        false
    }

    /// Mark the link is lost.
    ///
    /// # Returns
    /// True if the link was connected at the last tick.
    pub fn mark_lost(&mut self) -> bool {
        let was_connected = self.connected;
        self.connected = false;
        self.last_run_state = CpuState::Unknown;

        was_connected
    }

    /// Mark the link is connected.
    ///
    /// # Returns
    /// True if the link was disconnected at the last tick.
    pub fn mark_connected(&mut self) -> bool {
        let was_disconnected = !self.connected;
        self.connected = true;
        self.reconnect_counter = 0;

        was_disconnected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
