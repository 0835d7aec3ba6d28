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
use crate::error::TransportError;

/// Transport of the data block access to the PLC. The hardware uses the S7
/// protocol over ISO-on-TCP and the simulation uses the in-memory PLC.
pub trait PlcTransport: Send {
    /// Open the session to the PLC.
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the session. Safe to call when not connected.
    fn disconnect(&mut self);

    /// Read the bytes of a data block.
    ///
    /// # Arguments
    /// * `db_number` - Data block number.
    /// * `start` - Byte offset to begin the read.
    /// * `buffer` - Destination buffer. Its length is the requested size.
    ///
    /// # Returns
    /// Number of bytes actually received.
    fn read_db(
        &mut self,
        db_number: u16,
        start: u16,
        buffer: &mut [u8],
    ) -> Result<usize, TransportError>;

    /// Write the bytes of a data block.
    ///
    /// # Arguments
    /// * `db_number` - Data block number.
    /// * `start` - Byte offset to begin the write.
    /// * `data` - Bytes to write.
    fn write_db(&mut self, db_number: u16, start: u16, data: &[u8]) -> Result<(), TransportError>;

    /// Write a single bit of a data block. The other bits of the byte are
    /// unchanged.
    ///
    /// # Arguments
    /// * `db_number` - Data block number.
    /// * `byte` - Byte offset.
    /// * `bit` - Bit index (0..7).
    /// * `value` - Value of the bit.
    fn write_bit(
        &mut self,
        db_number: u16,
        byte: u16,
        bit: u8,
        value: bool,
    ) -> Result<(), TransportError>;

    /// Read the run state of the CPU.
    fn cpu_state(&mut self) -> Result<CpuState, TransportError>;
}
