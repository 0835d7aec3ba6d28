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

use log::error;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_TEST_SPEED;
use crate::plc::codec::{decode, FieldDescriptor};
use crate::plc::field_map::parameters;
use crate::plc::register_block::RegisterBlock;

/// Test parameters in the PLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestParameters {
    // Pipe diameter in mm.
    pub pipe_diameter: f64,
    // Pipe length in mm.
    pub pipe_length: f64,
    // Target deflection in percent of the diameter.
    pub deflection_percent: f64,
    // Target deflection in mm, computed by the PLC.
    pub deflection_target: f64,
    // Test speed in mm/min.
    pub test_speed: f64,
    // Maximum stroke in mm.
    pub max_stroke: f64,
    // Maximum force in N.
    pub max_force: f64,
    // Preload force in N.
    pub preload_force: f64,
    // Approach, contact, and return speeds in mm/min.
    pub approach_speed: f64,
    pub contact_speed: f64,
    pub return_speed: f64,
    // Read from the PLC or not.
    pub connected: bool,
}

impl Default for TestParameters {
    fn default() -> Self {
        Self {
            pipe_diameter: 0.0,
            pipe_length: 300.0,
            deflection_percent: 3.0,
            deflection_target: 0.0,
            test_speed: DEFAULT_TEST_SPEED,
            max_stroke: 100.0,
            max_force: 50000.0,
            preload_force: 10.0,
            approach_speed: 50.0,
            contact_speed: 2.0,
            return_speed: 100.0,
            connected: false,
        }
    }
}

impl TestParameters {
    /// Decode the parameters from the image of the parameter block. A field
    /// that is zero or not decodable keeps its default, because the PLC
    /// reports zeros while it is booting.
    ///
    /// # Arguments
    /// * `block` - Image of the parameter block.
    ///
    /// # Returns
    /// Test parameters.
    pub fn from_block(block: &RegisterBlock) -> Self {
        let mut values = Self {
            connected: true,
            ..Self::default()
        };

        for (descriptor, value) in values.fields_mut() {
            match decode(block, &descriptor) {
                Ok(decoded) => {
                    let decoded = decoded.as_f64();
                    if decoded != 0.0 {
                        *value = decoded;
                    }
                }
                Err(codec_error) => {
                    error!("Failed to decode the parameter: {codec_error}.");
                    debug_assert!(false, "{codec_error}");
                }
            }
        }

        values
    }

    fn fields_mut(&mut self) -> [(FieldDescriptor, &mut f64); 11] {
        [
            (parameters::PIPE_DIAMETER, &mut self.pipe_diameter),
            (parameters::PIPE_LENGTH, &mut self.pipe_length),
            (parameters::DEFLECTION_PERCENT, &mut self.deflection_percent),
            (parameters::DEFLECTION_TARGET, &mut self.deflection_target),
            (parameters::TEST_SPEED, &mut self.test_speed),
            (parameters::MAX_STROKE, &mut self.max_stroke),
            (parameters::MAX_FORCE, &mut self.max_force),
            (parameters::PRELOAD_FORCE, &mut self.preload_force),
            (parameters::APPROACH_SPEED, &mut self.approach_speed),
            (parameters::CONTACT_SPEED, &mut self.contact_speed),
            (parameters::RETURN_SPEED, &mut self.return_speed),
        ]
    }
}

/// Parameters to write. The fields that are None are not written. The
/// target deflection is computed by the PLC and is not writable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParameterUpdate {
    pub pipe_diameter: Option<f64>,
    pub pipe_length: Option<f64>,
    pub deflection_percent: Option<f64>,
    pub test_speed: Option<f64>,
    pub max_stroke: Option<f64>,
    pub max_force: Option<f64>,
    pub preload_force: Option<f64>,
    pub approach_speed: Option<f64>,
    pub contact_speed: Option<f64>,
    pub return_speed: Option<f64>,
}

impl ParameterUpdate {
    /// Requested fields in the order of the parameter block.
    ///
    /// # Returns
    /// Field descriptors and the values to write.
    pub fn fields(&self) -> Vec<(FieldDescriptor, f64)> {
        [
            (parameters::PIPE_DIAMETER, self.pipe_diameter),
            (parameters::PIPE_LENGTH, self.pipe_length),
            (parameters::DEFLECTION_PERCENT, self.deflection_percent),
            (parameters::TEST_SPEED, self.test_speed),
            (parameters::MAX_STROKE, self.max_stroke),
            (parameters::MAX_FORCE, self.max_force),
            (parameters::PRELOAD_FORCE, self.preload_force),
            (parameters::APPROACH_SPEED, self.approach_speed),
            (parameters::CONTACT_SPEED, self.contact_speed),
            (parameters::RETURN_SPEED, self.return_speed),
        ]
        .into_iter()
        .filter_map(|(descriptor, value)| value.map(|value| (descriptor, value)))
        .collect()
    }

    /// Nothing is requested or not.
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// Result of the parameter write. Each field is written independently.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParameterWriteReport {
    pub written: Vec<String>,
    pub failed: Vec<String>,
}

impl ParameterWriteReport {
    /// All the requested fields are written or not.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Final results of the last test in the PLC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    // Ring stiffness in kN/m2.
    pub ring_stiffness: f64,
    // Force at the target deflection in N.
    pub force_at_target: f64,
    // Nominal stiffness (SN) class.
    pub sn_class: i16,
    pub test_passed: bool,
    pub deflection_percent: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::enums::DataBlock;
    use crate::plc::codec::{encode_into, RegisterValue};

    #[test]
    fn test_default() {
        let values = TestParameters::default();

        assert_eq!(values.test_speed, 12.0);
        assert_eq!(values.max_force, 50000.0);
        assert!(!values.connected);
    }

    #[test]
    fn test_from_block() {
        let mut image = vec![0; DataBlock::Parameters.size()];
        encode_into(&mut image, RegisterValue::Real(160.0), &parameters::PIPE_DIAMETER).unwrap();
        encode_into(&mut image, RegisterValue::Real(4.8), &parameters::DEFLECTION_TARGET).unwrap();
        encode_into(&mut image, RegisterValue::Real(10.0), &parameters::TEST_SPEED).unwrap();

        let values = TestParameters::from_block(&RegisterBlock::new(1, 0, image));

        assert_eq!(values.pipe_diameter, 160.0);
        assert_eq!(values.deflection_target, 4.8f32 as f64);
        assert_eq!(values.test_speed, 10.0);

        // Zero falls back to the default.
        assert_eq!(values.pipe_length, 300.0);
        assert_eq!(values.return_speed, 100.0);

        assert!(values.connected);
    }

    #[test]
    fn test_parameter_update() {
        let update: ParameterUpdate =
            serde_json::from_value(json!({"pipe_length": 500.0, "test_speed": 5.0})).unwrap();

        let fields: Vec<(&str, f64)> = update
            .fields()
            .iter()
            .map(|(descriptor, value)| (descriptor.name, *value))
            .collect();

        assert_eq!(fields, vec![("pipe_length", 500.0), ("test_speed", 5.0)]);
        assert!(!update.is_empty());
        assert!(ParameterUpdate::default().is_empty());
    }

    #[test]
    fn test_parameter_update_ignores_target() {
        let update: ParameterUpdate =
            serde_json::from_value(json!({"deflection_target": 1.0})).unwrap();

        assert!(update.is_empty());
    }
}
