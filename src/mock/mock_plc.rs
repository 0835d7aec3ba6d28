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

use log::{error, info};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::sleep;
use std::time::Duration;

use crate::enums::{CpuState, DataBlock};
use crate::error::TransportError;
use crate::mock::mock_rig::MockRig;
use crate::plc::codec::{decode, encode_into, FieldDescriptor, RegisterValue};
use crate::plc::register_block::RegisterBlock;
use crate::plc::transport::PlcTransport;

/// Number of the calls to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MockCounts {
    pub connect: usize,
    pub disconnect: usize,
    pub read: usize,
    pub write: usize,
    pub write_bit: usize,
    pub cpu_state: usize,
}

impl MockCounts {
    /// Total number of the writes.
    pub fn writes(&self) -> usize {
        self.write + self.write_bit
    }
}

/// Bit write received by the mock PLC.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BitWrite {
    pub db_number: u16,
    pub byte: u16,
    pub bit: u8,
    pub value: bool,
}

struct MockState {
    // Images of the data blocks, keyed by the block number.
    blocks: HashMap<u16, Vec<u8>>,
    // The network path to the PLC works or not.
    is_reachable: bool,
    is_connected: bool,
    cpu_state: CpuState,
    // Number of the bytes to answer at most. Used to simulate the short read.
    truncate: Option<usize>,
    // (block number, byte offset) that reject the writes.
    failing_offsets: HashSet<(u16, usize)>,
    counts: MockCounts,
    bit_writes: Vec<BitWrite>,
    // Simulated test rig, only in the simulation mode.
    rig: Option<MockRig>,
    // Round-trip time of each read and write.
    latency: Option<Duration>,
}

impl MockState {
    fn check_session(&self) -> Result<(), TransportError> {
        if !self.is_reachable {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "mock PLC is not reachable",
            )));
        }

        if !self.is_connected {
            return Err(TransportError::NotConnected);
        }

        Ok(())
    }

    fn image(&mut self, db_number: u16) -> Result<&mut Vec<u8>, TransportError> {
        self.blocks
            .get_mut(&db_number)
            .ok_or(TransportError::NotFound)
    }
}

/// In-memory PLC. The clones share the same state, so a test keeps one clone
/// to inspect and drive what the link sees.
#[derive(Clone)]
pub struct MockPlc {
    _state: Arc<Mutex<MockState>>,
}

impl MockPlc {
    /// Create a new mock PLC with zero-filled data blocks. The CPU is running.
    ///
    /// # Returns
    /// New mock PLC.
    pub fn new() -> Self {
        let blocks = [
            DataBlock::Parameters,
            DataBlock::Results,
            DataBlock::Servo,
            DataBlock::Hmi,
        ]
        .iter()
        .map(|block| (block.number(), vec![0; block.size()]))
        .collect();

        Self {
            _state: Arc::new(Mutex::new(MockState {
                blocks,
                is_reachable: true,
                is_connected: false,
                cpu_state: CpuState::Run,
                truncate: None,
                failing_offsets: HashSet::new(),
                counts: MockCounts::default(),
                bit_writes: Vec::new(),
                rig: None,
                latency: None,
            })),
        }
    }

    /// Create a new mock PLC that simulates the test rig.
    ///
    /// # Returns
    /// New mock PLC in the simulation mode.
    pub fn new_simulation() -> Self {
        let plc = Self::new();
        {
            let mut state = plc.lock();
            let mut rig = MockRig::new();
            rig.init(&mut state.blocks);
            state.rig = Some(rig);
        }

        info!("Mock PLC simulates the test rig.");

        plc
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self._state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the network path to the PLC works or not.
    pub fn set_reachable(&self, is_reachable: bool) {
        self.lock().is_reachable = is_reachable;
    }

    /// Set the state of the CPU.
    pub fn set_cpu_state(&self, cpu_state: CpuState) {
        self.lock().cpu_state = cpu_state;
    }

    /// Delay each read and write by the round-trip time.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    fn wait_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            sleep(latency);
        }
    }

    /// Answer at most the number of the bytes to any read.
    pub fn set_truncate(&self, truncate: Option<usize>) {
        self.lock().truncate = truncate;
    }

    /// Reject the writes to the byte offsets of the data block.
    ///
    /// # Arguments
    /// * `block` - Data block.
    /// * `offsets` - Byte offsets.
    pub fn set_failing_offsets(&self, block: DataBlock, offsets: &[usize]) {
        let mut state = self.lock();
        state.failing_offsets = offsets
            .iter()
            .map(|offset| (block.number(), *offset))
            .collect();
    }

    /// Set the value of a field directly in the image.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor.
    /// * `value` - Value to set.
    pub fn set_value(&self, descriptor: &FieldDescriptor, value: RegisterValue) {
        let mut state = self.lock();
        if let Some(image) = state.blocks.get_mut(&descriptor.block.number()) {
            if let Err(error) = encode_into(image, value, descriptor) {
                error!("Mock PLC fails to set the {}: {error}.", descriptor.name);
            }
        }
    }

    /// Get the value of a field directly from the image.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor.
    ///
    /// # Returns
    /// Value of the field if decodable.
    pub fn get_value(&self, descriptor: &FieldDescriptor) -> Option<RegisterValue> {
        let state = self.lock();
        let number = descriptor.block.number();
        let image = state.blocks.get(&number)?;

        decode(&RegisterBlock::new(number, 0, image.clone()), descriptor).ok()
    }

    /// Get the number of the calls to the transport.
    pub fn counts(&self) -> MockCounts {
        self.lock().counts
    }

    /// Get the received bit writes in order.
    pub fn bit_writes(&self) -> Vec<BitWrite> {
        self.lock().bit_writes.clone()
    }

    /// Clear the counts and the received bit writes.
    pub fn clear_history(&self) {
        let mut state = self.lock();
        state.counts = MockCounts::default();
        state.bit_writes.clear();
    }
}

impl Default for MockPlc {
    fn default() -> Self {
        Self::new()
    }
}

impl PlcTransport for MockPlc {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.counts.connect += 1;

        if !state.is_reachable {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock PLC is not reachable",
            )));
        }

        state.is_connected = true;

        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.lock();
        state.counts.disconnect += 1;
        state.is_connected = false;
    }

    fn read_db(
        &mut self,
        db_number: u16,
        start: u16,
        buffer: &mut [u8],
    ) -> Result<usize, TransportError> {
        self.wait_latency();

        let mut state = self.lock();
        state.counts.read += 1;
        state.check_session()?;

        // Each poll of the results advances the simulated rig by one tick.
        if db_number == DataBlock::Results.number() {
            let MockState { rig, blocks, .. } = &mut *state;
            if let Some(rig) = rig.as_mut() {
                rig.step(blocks);
            }
        }

        let truncate = state.truncate;
        let image = state.image(db_number)?;

        let start = start as usize;
        if start >= image.len() {
            return Err(TransportError::InvalidAddress);
        }

        let mut size = buffer.len().min(image.len() - start);
        if let Some(truncate) = truncate {
            size = size.min(truncate);
        }
        buffer[..size].copy_from_slice(&image[start..(start + size)]);

        Ok(size)
    }

    fn write_db(&mut self, db_number: u16, start: u16, data: &[u8]) -> Result<(), TransportError> {
        self.wait_latency();

        let mut state = self.lock();
        state.counts.write += 1;
        state.check_session()?;

        if state
            .failing_offsets
            .contains(&(db_number, start as usize))
        {
            return Err(TransportError::InvalidAddress);
        }

        let image = state.image(db_number)?;
        let start = start as usize;
        if start + data.len() > image.len() {
            return Err(TransportError::InvalidAddress);
        }
        image[start..(start + data.len())].copy_from_slice(data);

        Ok(())
    }

    fn write_bit(
        &mut self,
        db_number: u16,
        byte: u16,
        bit: u8,
        value: bool,
    ) -> Result<(), TransportError> {
        self.wait_latency();

        let mut state = self.lock();
        state.counts.write_bit += 1;
        state.check_session()?;

        if bit > 7 || state.failing_offsets.contains(&(db_number, byte as usize)) {
            return Err(TransportError::InvalidAddress);
        }

        state.bit_writes.push(BitWrite {
            db_number,
            byte,
            bit,
            value,
        });

        let image = state.image(db_number)?;
        let byte = image
            .get_mut(byte as usize)
            .ok_or(TransportError::InvalidAddress)?;
        if value {
            *byte |= 1 << bit;
        } else {
            *byte &= !(1 << bit);
        }

        Ok(())
    }

    fn cpu_state(&mut self) -> Result<CpuState, TransportError> {
        let mut state = self.lock();
        state.counts.cpu_state += 1;
        state.check_session()?;

        Ok(state.cpu_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::plc::field_map::{results, servo};

    #[test]
    fn test_connect() {
        let mut plc = MockPlc::new();

        assert!(plc.connect().is_ok());

        plc.set_reachable(false);
        assert!(plc.connect().is_err());

        assert_eq!(plc.counts().connect, 2);
    }

    #[test]
    fn test_read_db_not_connected() {
        let mut plc = MockPlc::new();
        let mut buffer = [0; 4];

        assert!(matches!(
            plc.read_db(2, 0, &mut buffer),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_read_db() {
        let mut plc = MockPlc::new();
        plc.set_value(&results::TEST_STATUS, RegisterValue::Int(0x0102));
        plc.connect().unwrap();

        let mut buffer = [0; 2];
        assert_eq!(plc.read_db(2, 22, &mut buffer).unwrap(), 2);
        assert_eq!(buffer, [0x01, 0x02]);

        plc.set_truncate(Some(1));
        assert_eq!(plc.read_db(2, 22, &mut buffer).unwrap(), 1);

        assert!(matches!(
            plc.read_db(9, 0, &mut buffer),
            Err(TransportError::NotFound)
        ));
    }

    #[test]
    fn test_write_bit() {
        let mut plc = MockPlc::new();
        plc.connect().unwrap();

        plc.write_bit(3, 25, 0, true).unwrap();

        assert_eq!(
            plc.get_value(&servo::REMOTE_MODE),
            Some(RegisterValue::Bit(true))
        );
        assert_eq!(
            plc.bit_writes(),
            vec![BitWrite {
                db_number: 3,
                byte: 25,
                bit: 0,
                value: true
            }]
        );

        plc.clear_history();

        assert_eq!(plc.counts(), MockCounts::default());
        assert!(plc.bit_writes().is_empty());
    }

    #[test]
    fn test_failing_offsets() {
        let mut plc = MockPlc::new();
        plc.connect().unwrap();
        plc.set_failing_offsets(DataBlock::Parameters, &[4]);

        assert!(matches!(
            plc.write_db(1, 4, &[0; 4]),
            Err(TransportError::InvalidAddress)
        ));
        assert!(plc.write_db(1, 0, &[0; 4]).is_ok());
    }
}
