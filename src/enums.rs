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

use serde::Serialize;
use strum_macros::{AsRefStr, EnumIter, FromRepr, VariantNames};

/// Command status.
#[derive(Debug, VariantNames, AsRefStr)]
pub enum CommandStatus {
    Success,
    Fail,
    Ack,
    NoAck,
}

/// Data block (DB) in the programmable logic controller (PLC).
#[derive(FromRepr, Debug, PartialEq, Clone, Copy, Hash, Eq, EnumIter, AsRefStr)]
#[repr(u16)]
pub enum DataBlock {
    Parameters = 1,
    Results = 2,
    Servo = 3,
    Hmi = 4,
}

impl DataBlock {
    /// Block number in the PLC address space.
    pub const fn number(self) -> u16 {
        self as u16
    }

    /// Fixed size of the block in bytes.
    pub const fn size(self) -> usize {
        match self {
            DataBlock::Parameters => 54,
            DataBlock::Results => 85,
            DataBlock::Servo => 40,
            DataBlock::Hmi => 65,
        }
    }
}

/// Kind of a register value.
#[derive(Debug, PartialEq, Clone, Copy, Eq, AsRefStr)]
pub enum ValueKind {
    // IEEE-754 32-bit float, big-endian.
    Real,
    // 16-bit signed integer, big-endian.
    Int,
    // Single bit in a byte.
    Bit,
}

impl ValueKind {
    /// Number of bytes occupied in the block.
    pub const fn size(self) -> usize {
        match self {
            ValueKind::Real => 4,
            ValueKind::Int => 2,
            ValueKind::Bit => 1,
        }
    }
}

/// Jog direction of the crosshead.
#[derive(Debug, PartialEq, Clone, Copy, Eq, Hash, EnumIter, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JogDirection {
    Forward,
    Backward,
}

impl JogDirection {
    /// The other direction.
    pub fn opposite(self) -> Self {
        match self {
            JogDirection::Forward => JogDirection::Backward,
            JogDirection::Backward => JogDirection::Forward,
        }
    }
}

/// Reason to reject an operator command. The rejection is an expected
/// outcome, not a fault.
#[derive(Debug, PartialEq, Clone, Copy, Eq, AsRefStr, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    LocalMode,
    NotConnected,
    ModeChangeLocked,
    StoppedWhileActivating,
}

impl RejectReason {
    /// Message for the operator.
    pub fn describe(self) -> &'static str {
        match self {
            RejectReason::LocalMode => "Machine is in local mode. Switch to remote mode to jog.",
            RejectReason::NotConnected => "PLC is not connected.",
            RejectReason::ModeChangeLocked => "Mode change is not allowed by the PLC.",
            RejectReason::StoppedWhileActivating => {
                "Jog is stopped by a safety stop while it is activated."
            }
        }
    }
}

/// Run state of the PLC CPU.
#[derive(FromRepr, Debug, PartialEq, Clone, Copy, Eq, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum CpuState {
    Unknown = 0x00,
    Stop = 0x04,
    Run = 0x08,
}

impl CpuState {
    /// Convert the status byte of the CPU status list.
    ///
    /// # Arguments
    /// * `status` - Status byte.
    ///
    /// # Returns
    /// CPU state. Unknown byte values map to the unknown state.
    pub fn from_status_byte(status: u8) -> Self {
        CpuState::from_repr(status).unwrap_or(CpuState::Unknown)
    }
}
