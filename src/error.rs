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

use std::io;
use thiserror::Error;

use crate::enums::{DataBlock, RejectReason, ValueKind};

/// Errors of the register codec. These are configuration defects of the
/// field table, not runtime conditions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("field {name} at byte {offset} with {size} bytes exceeds the block of {length} bytes starting at {start}")]
    OutOfRange {
        name: &'static str,
        offset: usize,
        size: usize,
        start: usize,
        length: usize,
    },
    #[error("field {name} belongs to {expected:?} but the block is DB{actual}")]
    WrongBlock {
        name: &'static str,
        expected: DataBlock,
        actual: u16,
    },
    #[error("field {name} has an invalid bit index {bit:?}")]
    InvalidBit { name: &'static str, bit: Option<u8> },
    #[error("field {name} expects a {expected:?} value")]
    KindMismatch {
        name: &'static str,
        expected: ValueKind,
    },
}

/// Errors of the transport to the PLC.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
    #[error("TCP connection failed")]
    TcpConnectionFailed,
    #[error("ISO-on-TCP connection failed")]
    IsoConnectionFailed,
    #[error("fragmented ISO packet")]
    IsoFragmentedPacket,
    #[error("invalid ISO header")]
    IsoInvalidHeader,
    #[error("invalid ISO telegram")]
    IsoInvalidTelegram,
    #[error("S7 PDU negotiation failed")]
    PduNegotiationFailed,
    #[error("S7 resource not found in the CPU")]
    NotFound,
    #[error("S7 invalid address")]
    InvalidAddress,
    #[error("S7 unspecified error with code {0:#04x}")]
    Unspecified(u8),
}

impl TransportError {
    /// The session is unusable after the error. The item errors reported by
    /// the PLC in a valid response keep the session.
    pub fn is_session_lost(&self) -> bool {
        !matches!(
            self,
            TransportError::NotFound | TransportError::InvalidAddress | TransportError::Unspecified(_)
        )
    }
}

/// Errors of the PLC link.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("PLC is unavailable: {0}")]
    Unavailable(String),
    #[error("PLC is not connected")]
    NotConnected,
    #[error("PLC refuses the access: {0}")]
    Refused(String),
    #[error("short read of DB{db}: expected {expected} bytes, got {actual}")]
    ShortRead {
        db: u16,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors to write the test parameters.
#[derive(Debug, Error, PartialEq)]
pub enum WriteError {
    #[error("PLC is disconnected")]
    Disconnected,
}

/// Errors of the operator commands.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command is rejected: {}", .0.as_ref())]
    Rejected(RejectReason),
    #[error(transparent)]
    Link(#[from] LinkError),
}

/// Errors to save the test record.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize the record: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write the data points: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid time zone offset: {0}")]
    TimeZone(#[from] time::error::ComponentRange),
    #[error("failed to format the test date: {0}")]
    TimeFormat(#[from] time::error::Format),
}

/// Errors to start the application.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("failed to read the configuration: {0}")]
    Config(#[from] config::ConfigError),
    #[error("failed to prepare the test storage: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("failed to run the TCP/IP server: {0}")]
    Io(#[from] io::Error),
}
