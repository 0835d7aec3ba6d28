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

use crate::enums::{DataBlock, ValueKind};
use crate::error::CodecError;
use crate::plc::codec::{decode, FieldDescriptor, RegisterValue};

/// Immutable image of a range of bytes read from a data block in one round
/// trip.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterBlock {
    // Block number.
    _number: u16,
    // Byte offset of the first byte in the block.
    _start: usize,
    // Raw bytes.
    _bytes: Vec<u8>,
}

impl RegisterBlock {
    /// Create a new register block.
    ///
    /// # Arguments
    /// * `number` - Block number.
    /// * `start` - Byte offset of the first byte in the block.
    /// * `bytes` - Raw bytes.
    ///
    /// # Returns
    /// New register block.
    pub fn new(number: u16, start: usize, bytes: Vec<u8>) -> Self {
        Self {
            _number: number,
            _start: start,
            _bytes: bytes,
        }
    }

    /// Create a zero-filled image of the whole data block.
    pub fn zeros(block: DataBlock) -> Self {
        Self::new(block.number(), 0, vec![0; block.size()])
    }

    pub fn number(&self) -> u16 {
        self._number
    }

    pub fn start(&self) -> usize {
        self._start
    }

    pub fn len(&self) -> usize {
        self._bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self._bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self._bytes
    }

    /// Decode a 32-bit float field.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor of kind Real.
    ///
    /// # Returns
    /// Value of the field.
    pub fn real(&self, descriptor: &FieldDescriptor) -> Result<f32, CodecError> {
        match decode(self, descriptor)? {
            RegisterValue::Real(value) => Ok(value),
            _ => Err(Self::mismatch(descriptor, ValueKind::Real)),
        }
    }

    /// Decode a 16-bit signed integer field.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor of kind Int.
    ///
    /// # Returns
    /// Value of the field.
    pub fn int(&self, descriptor: &FieldDescriptor) -> Result<i16, CodecError> {
        match decode(self, descriptor)? {
            RegisterValue::Int(value) => Ok(value),
            _ => Err(Self::mismatch(descriptor, ValueKind::Int)),
        }
    }

    /// Decode a single bit field.
    ///
    /// # Arguments
    /// * `descriptor` - Field descriptor of kind Bit.
    ///
    /// # Returns
    /// Value of the field.
    pub fn bit(&self, descriptor: &FieldDescriptor) -> Result<bool, CodecError> {
        match decode(self, descriptor)? {
            RegisterValue::Bit(value) => Ok(value),
            _ => Err(Self::mismatch(descriptor, ValueKind::Bit)),
        }
    }

    fn mismatch(descriptor: &FieldDescriptor, expected: ValueKind) -> CodecError {
        CodecError::KindMismatch {
            name: descriptor.name,
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::plc::codec::encode_into;
    use crate::plc::field_map::results;

    #[test]
    fn test_zeros() {
        let block = RegisterBlock::zeros(DataBlock::Hmi);

        assert_eq!(block.number(), 4);
        assert_eq!(block.start(), 0);
        assert_eq!(block.len(), 65);
        assert!(block.as_bytes().iter().all(|byte| *byte == 0));
    }

    #[test]
    fn test_typed_helpers() {
        let mut image = vec![0; DataBlock::Results.size()];
        encode_into(&mut image, RegisterValue::Real(2.5), &results::ACTUAL_FORCE).unwrap();
        encode_into(&mut image, RegisterValue::Int(-3), &results::TEST_STATUS).unwrap();
        encode_into(&mut image, RegisterValue::Bit(true), &results::TEST_PASSED).unwrap();

        let block = RegisterBlock::new(2, 0, image);

        assert_eq!(block.real(&results::ACTUAL_FORCE), Ok(2.5));
        assert_eq!(block.int(&results::TEST_STATUS), Ok(-3));
        assert_eq!(block.bit(&results::TEST_PASSED), Ok(true));
    }

    #[test]
    fn test_typed_helper_mismatch() {
        let block = RegisterBlock::zeros(DataBlock::Results);

        assert_eq!(
            block.int(&results::ACTUAL_FORCE),
            Err(CodecError::KindMismatch {
                name: "actual_force",
                expected: ValueKind::Int,
            })
        );
    }
}
