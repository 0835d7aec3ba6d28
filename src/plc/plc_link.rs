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

use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex, MutexGuard,
};

use crate::enums::{CpuState, DataBlock};
use crate::error::{LinkError, TransportError};
use crate::plc::codec::{decode, encode, FieldDescriptor, RegisterValue};
use crate::plc::register_block::RegisterBlock;
use crate::plc::transport::PlcTransport;

struct LinkInner {
    // Transport to the PLC.
    transport: Box<dyn PlcTransport>,
    // Last known run state of the CPU.
    run_state: CpuState,
}

/// Session to the PLC. The access is serialized internally so the callers
/// never interleave in the middle of a block. The link never retries and a
/// lost session stays disconnected until the next connect().
pub struct PlcLink {
    _inner: Mutex<LinkInner>,
    // Connected or not. Readable without waiting for an ongoing operation.
    _is_connected: AtomicBool,
    // IP address of the PLC.
    _ip: String,
}

impl PlcLink {
    /// Create a new PLC link. The link is disconnected.
    ///
    /// # Arguments
    /// * `transport` - Transport to the PLC.
    /// * `ip` - IP address of the PLC.
    ///
    /// # Returns
    /// New PLC link.
    pub fn new(transport: Box<dyn PlcTransport>, ip: &str) -> Self {
        Self {
            _inner: Mutex::new(LinkInner {
                transport,
                run_state: CpuState::Unknown,
            }),
            _is_connected: AtomicBool::new(false),
            _ip: String::from(ip),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self._inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Handle the transport failure. The link is disconnected if the session
    /// is lost.
    ///
    /// # Arguments
    /// * `inner` - Locked inner state.
    /// * `error` - Transport error.
    ///
    /// # Returns
    /// Link error to report.
    fn fail(&self, inner: &mut LinkInner, error: TransportError) -> LinkError {
        if !error.is_session_lost() {
            debug!("PLC at {} refuses the access: {error}.", self._ip);
            return LinkError::Refused(error.to_string());
        }

        if self._is_connected.swap(false, Ordering::Relaxed) {
            warn!("PLC link to {} is lost: {error}.", self._ip);
        }

        inner.transport.disconnect();
        inner.run_state = CpuState::Unknown;

        LinkError::Unavailable(error.to_string())
    }

    /// Connect to the PLC. Connecting an already connected link is a no-op.
    pub fn connect(&self) -> Result<(), LinkError> {
        let mut inner = self.lock();
        if self.is_connected() {
            return Ok(());
        }

        if let Err(error) = inner.transport.connect() {
            inner.transport.disconnect();
            debug!("Failed to connect the PLC at {}: {error}.", self._ip);

            return Err(LinkError::Unavailable(error.to_string()));
        }

        self._is_connected.store(true, Ordering::Relaxed);
        info!("PLC link to {} is connected.", self._ip);

        // The session is usable even if the CPU status list is not readable.
        inner.run_state = match inner.transport.cpu_state() {
            Ok(state) => state,
            Err(error) => {
                debug!("Failed to read the CPU state: {error}.");
                CpuState::Unknown
            }
        };

        Ok(())
    }

    /// Disconnect from the PLC.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.transport.disconnect();
        inner.run_state = CpuState::Unknown;

        if self._is_connected.swap(false, Ordering::Relaxed) {
            info!("PLC link to {} is disconnected.", self._ip);
        }
    }

    /// Connected or not.
    pub fn is_connected(&self) -> bool {
        self._is_connected.load(Ordering::Relaxed)
    }

    /// IP address of the PLC.
    pub fn ip(&self) -> &str {
        &self._ip
    }

    /// Last known run state of the CPU.
    pub fn run_state(&self) -> CpuState {
        if !self.is_connected() {
            return CpuState::Unknown;
        }

        self.lock().run_state
    }

    /// Read the run state of the CPU again.
    ///
    /// # Returns
    /// Run state of the CPU.
    pub fn refresh_run_state(&self) -> Result<CpuState, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let mut inner = self.lock();
        match inner.transport.cpu_state() {
            Ok(state) => {
                inner.run_state = state;
                Ok(state)
            }
            Err(error) => Err(self.fail(&mut inner, error)),
        }
    }

    /// Read a range of bytes of a data block in one round trip.
    ///
    /// # Arguments
    /// * `db_number` - Data block number.
    /// * `offset` - Byte offset.
    /// * `length` - Number of bytes.
    ///
    /// # Returns
    /// Register block. A short read is an error.
    pub fn read_block(
        &self,
        db_number: u16,
        offset: usize,
        length: usize,
    ) -> Result<RegisterBlock, LinkError> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let mut inner = self.lock();
        let mut buffer = vec![0; length];
        let received = match inner
            .transport
            .read_db(db_number, offset as u16, &mut buffer)
        {
            Ok(received) => received,
            Err(error) => return Err(self.fail(&mut inner, error)),
        };

        if received < length {
            return Err(LinkError::ShortRead {
                db: db_number,
                expected: length,
                actual: received,
            });
        }

        Ok(RegisterBlock::new(db_number, offset, buffer))
    }

    /// Read the whole data block.
    ///
    /// # Arguments
    /// * `block` - Data block.
    ///
    /// # Returns
    /// Register block.
    pub fn read_data_block(&self, block: DataBlock) -> Result<RegisterBlock, LinkError> {
        self.read_block(block.number(), 0, block.size())
    }

    /// Read a single field.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor.
    ///
    /// # Returns
    /// Value of the field.
    pub fn read_value(&self, descriptor: &FieldDescriptor) -> Result<RegisterValue, LinkError> {
        let block = self.read_block(
            descriptor.block.number(),
            descriptor.offset,
            descriptor.size(),
        )?;

        Ok(decode(&block, descriptor)?)
    }

    /// Write a single field. A bit is written with the bit access so the
    /// other bits of the byte are unchanged.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor.
    /// * `value` - Value to write.
    pub fn write_value(
        &self,
        descriptor: &FieldDescriptor,
        value: RegisterValue,
    ) -> Result<(), LinkError> {
        let bytes = encode(value, descriptor)?;

        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let mut inner = self.lock();
        let db_number = descriptor.block.number();
        let result = match (value, descriptor.bit) {
            (RegisterValue::Bit(state), Some(bit)) => {
                inner
                    .transport
                    .write_bit(db_number, descriptor.offset as u16, bit, state)
            }
            _ => inner
                .transport
                .write_db(db_number, descriptor.offset as u16, &bytes),
        };

        result.map_err(|error| self.fail(&mut inner, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mock::mock_plc::MockPlc;
    use crate::plc::field_map::{results, servo};

    fn create_link() -> (PlcLink, MockPlc) {
        let plc = MockPlc::new();
        let link = PlcLink::new(Box::new(plc.clone()), "127.0.0.1");

        (link, plc)
    }

    #[test]
    fn test_new() {
        let (link, _) = create_link();

        assert!(!link.is_connected());
        assert_eq!(link.run_state(), CpuState::Unknown);
        assert_eq!(link.ip(), "127.0.0.1");
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (link, plc) = create_link();

        assert!(link.connect().is_ok());
        assert!(link.connect().is_ok());

        assert!(link.is_connected());
        assert_eq!(plc.counts().connect, 1);
        assert_eq!(link.run_state(), CpuState::Run);
    }

    #[test]
    fn test_connect_fail() {
        let (link, plc) = create_link();
        plc.set_reachable(false);

        assert!(matches!(link.connect(), Err(LinkError::Unavailable(_))));
        assert!(!link.is_connected());
    }

    #[test]
    fn test_read_block_not_connected() {
        let (link, plc) = create_link();

        assert!(matches!(
            link.read_data_block(DataBlock::Results),
            Err(LinkError::NotConnected)
        ));
        assert_eq!(plc.counts().read, 0);
    }

    #[test]
    fn test_read_block() {
        let (link, plc) = create_link();
        plc.set_value(&results::TEST_STATUS, RegisterValue::Int(3));
        link.connect().unwrap();

        let block = link.read_data_block(DataBlock::Results).unwrap();

        assert_eq!(block.len(), DataBlock::Results.size());
        assert_eq!(
            decode(&block, &results::TEST_STATUS),
            Ok(RegisterValue::Int(3))
        );
    }

    #[test]
    fn test_read_block_short_read() {
        let (link, plc) = create_link();
        link.connect().unwrap();

        plc.set_truncate(Some(10));

        assert!(matches!(
            link.read_data_block(DataBlock::Servo),
            Err(LinkError::ShortRead {
                db: 3,
                expected: 40,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_transport_failure_disconnects() {
        let (link, plc) = create_link();
        link.connect().unwrap();

        plc.set_reachable(false);

        assert!(matches!(
            link.read_data_block(DataBlock::Hmi),
            Err(LinkError::Unavailable(_))
        ));
        assert!(!link.is_connected());
        assert_eq!(link.run_state(), CpuState::Unknown);

        // No retry inside the link.
        assert_eq!(plc.counts().read, 1);
        assert_eq!(plc.counts().connect, 1);
    }

    #[test]
    fn test_read_and_write_value() {
        let (link, plc) = create_link();
        link.connect().unwrap();

        link.write_value(&servo::JOG_VELOCITY_SP, RegisterValue::Real(25.0))
            .unwrap();

        assert_eq!(
            link.read_value(&servo::JOG_VELOCITY_SP).unwrap(),
            RegisterValue::Real(25.0)
        );
        assert_eq!(
            plc.get_value(&servo::JOG_VELOCITY_SP),
            Some(RegisterValue::Real(25.0))
        );
    }

    #[test]
    fn test_write_bit_keeps_other_bits() {
        let (link, plc) = create_link();
        plc.set_value(&servo::SERVO_READY, RegisterValue::Bit(true));
        link.connect().unwrap();

        link.write_value(&servo::ENABLE, RegisterValue::Bit(true)).unwrap();

        assert_eq!(plc.get_value(&servo::ENABLE), Some(RegisterValue::Bit(true)));
        assert_eq!(
            plc.get_value(&servo::SERVO_READY),
            Some(RegisterValue::Bit(true))
        );
        assert_eq!(plc.counts().write_bit, 1);
    }

    #[test]
    fn test_write_value_kind_mismatch() {
        let (link, plc) = create_link();
        link.connect().unwrap();

        assert!(matches!(
            link.write_value(&servo::ENABLE, RegisterValue::Real(1.0)),
            Err(LinkError::Codec(_))
        ));
        assert_eq!(plc.counts().write_bit, 0);
        assert!(link.is_connected());
    }

    #[test]
    fn test_refused_write_keeps_session() {
        let (link, plc) = create_link();
        link.connect().unwrap();

        plc.set_failing_offsets(DataBlock::Servo, &[26]);

        assert!(matches!(
            link.write_value(&servo::JOG_VELOCITY_SP, RegisterValue::Real(1.0)),
            Err(LinkError::Refused(_))
        ));
        assert!(link.is_connected());
    }

    #[test]
    fn test_refresh_run_state() {
        let (link, plc) = create_link();

        assert!(matches!(
            link.refresh_run_state(),
            Err(LinkError::NotConnected)
        ));

        link.connect().unwrap();
        plc.set_cpu_state(CpuState::Stop);

        assert_eq!(link.refresh_run_state().unwrap(), CpuState::Stop);
        assert_eq!(link.run_state(), CpuState::Stop);
    }
}
