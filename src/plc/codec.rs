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
use crate::plc::register_block::RegisterBlock;

/// Typed value of a register field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    Real(f32),
    Int(i16),
    Bit(bool),
}

impl RegisterValue {
    /// Kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self {
            RegisterValue::Real(_) => ValueKind::Real,
            RegisterValue::Int(_) => ValueKind::Int,
            RegisterValue::Bit(_) => ValueKind::Bit,
        }
    }

    /// Numeric value. A bit is 1.0 or 0.0.
    pub fn as_f64(&self) -> f64 {
        match *self {
            RegisterValue::Real(value) => value as f64,
            RegisterValue::Int(value) => value as f64,
            RegisterValue::Bit(value) => f64::from(u8::from(value)),
        }
    }

    /// Boolean value. A number is true if it is not zero.
    pub fn as_bool(&self) -> bool {
        match *self {
            RegisterValue::Real(value) => value != 0.0,
            RegisterValue::Int(value) => value != 0,
            RegisterValue::Bit(value) => value,
        }
    }
}

/// Static description of a field in a data block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldDescriptor {
    // Semantic name.
    pub name: &'static str,
    // Data block that holds the field.
    pub block: DataBlock,
    // Byte offset in the data block.
    pub offset: usize,
    // Bit index (0 is LSB) for the bit field.
    pub bit: Option<u8>,
    // Kind of the value.
    pub kind: ValueKind,
}

impl FieldDescriptor {
    /// Describe a 32-bit float field.
    pub const fn real(name: &'static str, block: DataBlock, offset: usize) -> Self {
        Self {
            name,
            block,
            offset,
            bit: None,
            kind: ValueKind::Real,
        }
    }

    /// Describe a 16-bit signed integer field.
    pub const fn int(name: &'static str, block: DataBlock, offset: usize) -> Self {
        Self {
            name,
            block,
            offset,
            bit: None,
            kind: ValueKind::Int,
        }
    }

    /// Describe a single bit field.
    pub const fn bit(name: &'static str, block: DataBlock, offset: usize, bit: u8) -> Self {
        Self {
            name,
            block,
            offset,
            bit: Some(bit),
            kind: ValueKind::Bit,
        }
    }

    /// Number of bytes occupied in the block.
    pub const fn size(&self) -> usize {
        self.kind.size()
    }

    /// Check the bit index matches the kind of the field.
    pub const fn has_valid_bit(&self) -> bool {
        match (self.kind, self.bit) {
            (ValueKind::Bit, Some(bit)) => bit <= 7,
            (ValueKind::Bit, None) => false,
            (_, None) => true,
            (_, Some(_)) => false,
        }
    }

    /// Check the field is inside its data block and the bit index is valid.
    pub const fn is_valid(&self) -> bool {
        self.has_valid_bit() && (self.offset + self.size() <= self.block.size())
    }
}

/// Locate the field in the block. All the checks happen before any byte is
/// extracted.
///
/// # Arguments
/// * `block` - Register block.
/// * `descriptor` - Field descriptor.
///
/// # Returns
/// Index of the first byte of the field in the block.
fn locate(block: &RegisterBlock, descriptor: &FieldDescriptor) -> Result<usize, CodecError> {
    if block.number() != descriptor.block.number() {
        return Err(CodecError::WrongBlock {
            name: descriptor.name,
            expected: descriptor.block,
            actual: block.number(),
        });
    }

    if !descriptor.has_valid_bit() {
        return Err(CodecError::InvalidBit {
            name: descriptor.name,
            bit: descriptor.bit,
        });
    }

    let end = descriptor.offset + descriptor.size();
    if (descriptor.offset < block.start()) || (end > block.start() + block.len()) {
        return Err(CodecError::OutOfRange {
            name: descriptor.name,
            offset: descriptor.offset,
            size: descriptor.size(),
            start: block.start(),
            length: block.len(),
        });
    }

    Ok(descriptor.offset - block.start())
}

/// Check the value can be written to the field.
///
/// # Arguments
/// * `value` - Value to write.
/// * `descriptor` - Field descriptor.
fn check_writable(value: &RegisterValue, descriptor: &FieldDescriptor) -> Result<(), CodecError> {
    if value.kind() != descriptor.kind {
        return Err(CodecError::KindMismatch {
            name: descriptor.name,
            expected: descriptor.kind,
        });
    }

    if !descriptor.has_valid_bit() {
        return Err(CodecError::InvalidBit {
            name: descriptor.name,
            bit: descriptor.bit,
        });
    }

    if !descriptor.is_valid() {
        return Err(CodecError::OutOfRange {
            name: descriptor.name,
            offset: descriptor.offset,
            size: descriptor.size(),
            start: 0,
            length: descriptor.block.size(),
        });
    }

    Ok(())
}

/// Decode the field from the block.
///
/// # Arguments
/// * `block` - Register block.
/// * `descriptor` - Field descriptor.
///
/// # Returns
/// Decoded value.
pub fn decode(block: &RegisterBlock, descriptor: &FieldDescriptor) -> Result<RegisterValue, CodecError> {
    let index = locate(block, descriptor)?;
    let bytes = block.as_bytes();

    let value = match descriptor.kind {
        ValueKind::Real => {
            let mut raw = [0; 4];
            raw.copy_from_slice(&bytes[index..(index + 4)]);
            RegisterValue::Real(f32::from_be_bytes(raw))
        }
        ValueKind::Int => {
            let mut raw = [0; 2];
            raw.copy_from_slice(&bytes[index..(index + 2)]);
            RegisterValue::Int(i16::from_be_bytes(raw))
        }
        ValueKind::Bit => {
            let bit = descriptor.bit.unwrap_or_default();
            RegisterValue::Bit(((bytes[index] >> bit) & 1) == 1)
        }
    };

    Ok(value)
}

/// Encode the value of the field to the bytes to write. A bit is encoded as
/// its byte with only the addressed bit set or cleared.
///
/// # Arguments
/// * `value` - Value to encode.
/// * `descriptor` - Field descriptor.
///
/// # Returns
/// Bytes to write at the offset of the field.
pub fn encode(value: RegisterValue, descriptor: &FieldDescriptor) -> Result<Vec<u8>, CodecError> {
    check_writable(&value, descriptor)?;

    let bytes = match value {
        RegisterValue::Real(value) => value.to_be_bytes().to_vec(),
        RegisterValue::Int(value) => value.to_be_bytes().to_vec(),
        RegisterValue::Bit(value) => {
            let bit = descriptor.bit.unwrap_or_default();
            vec![u8::from(value) << bit]
        }
    };

    Ok(bytes)
}

/// Encode the value into the image of the whole data block. Only the bytes
/// (or the single bit) of the field change.
///
/// # Arguments
/// * `image` - Image of the data block starting at byte 0.
/// * `value` - Value to encode.
/// * `descriptor` - Field descriptor.
pub fn encode_into(
    image: &mut [u8],
    value: RegisterValue,
    descriptor: &FieldDescriptor,
) -> Result<(), CodecError> {
    check_writable(&value, descriptor)?;

    let end = descriptor.offset + descriptor.size();
    if end > image.len() {
        return Err(CodecError::OutOfRange {
            name: descriptor.name,
            offset: descriptor.offset,
            size: descriptor.size(),
            start: 0,
            length: image.len(),
        });
    }

    match value {
        RegisterValue::Bit(value) => {
            let mask = 1 << descriptor.bit.unwrap_or_default();
            if value {
                image[descriptor.offset] |= mask;
            } else {
                image[descriptor.offset] &= !mask;
            }
        }
        _ => {
            let bytes = encode(value, descriptor)?;
            image[descriptor.offset..end].copy_from_slice(&bytes);
        }
    }

    Ok(())
}
