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

use std::collections::HashMap;

use crate::plc::codec::{decode, encode_into, FieldDescriptor, RegisterValue};
use crate::plc::field_map::{command, hmi, parameters, results, servo};
use crate::plc::register_block::RegisterBlock;

// Simulated time of one tick in seconds.
const TIME_TICK: f64 = 0.1;
// Stiffness of the simulated pipe in N/mm.
const PIPE_STIFFNESS: f64 = 450.0;

/// Read the value of a field from the images.
fn get(blocks: &HashMap<u16, Vec<u8>>, descriptor: &FieldDescriptor) -> RegisterValue {
    let number = descriptor.block.number();
    blocks
        .get(&number)
        .and_then(|image| decode(&RegisterBlock::new(number, 0, image.clone()), descriptor).ok())
        .unwrap_or(RegisterValue::Bit(false))
}

/// Write the value of a field to the images.
fn set(blocks: &mut HashMap<u16, Vec<u8>>, descriptor: &FieldDescriptor, value: RegisterValue) {
    if let Some(image) = blocks.get_mut(&descriptor.block.number()) {
        let _ = encode_into(image, value, descriptor);
    }
}

fn set_real(blocks: &mut HashMap<u16, Vec<u8>>, descriptor: &FieldDescriptor, value: f64) {
    set(blocks, descriptor, RegisterValue::Real(value as f32));
}

fn set_bit(blocks: &mut HashMap<u16, Vec<u8>>, descriptor: &FieldDescriptor, value: bool) {
    set(blocks, descriptor, RegisterValue::Bit(value));
}

/// Take the command bit. The bit is cleared like the PLC program does after
/// the command is handled.
fn take(blocks: &mut HashMap<u16, Vec<u8>>, descriptor: &FieldDescriptor) -> bool {
    let is_set = get(blocks, descriptor).as_bool();
    if is_set {
        set_bit(blocks, descriptor, false);
    }

    is_set
}

/// Simulated ring-stiffness test rig behind the mock PLC.
pub struct MockRig {
    // Crosshead position in mm.
    _position: f64,
    // Position at the contact with the pipe in mm.
    _contact_position: f64,
    // Offset of the load cell in N.
    _force_offset: f64,
    // Test status.
    _status: i16,
    // Data points recorded by the PLC.
    _data_points: i16,
}

impl MockRig {
    /// Create a new simulated rig.
    pub fn new() -> Self {
        Self {
            _position: 0.0,
            _contact_position: 0.0,
            _force_offset: 0.0,
            _status: 0,
            _data_points: 0,
        }
    }

    /// Initialize the images with a powered rig in the remote mode.
    ///
    /// # Arguments
    /// * `blocks` - Images of the data blocks.
    pub fn init(&mut self, blocks: &mut HashMap<u16, Vec<u8>>) {
        for (descriptor, value) in [
            (parameters::PIPE_DIAMETER, 200.0),
            (parameters::PIPE_LENGTH, 300.0),
            (parameters::DEFLECTION_PERCENT, 3.0),
            (parameters::DEFLECTION_TARGET, 6.0),
            (parameters::TEST_SPEED, 12.0),
            (parameters::MAX_STROKE, 100.0),
            (parameters::MAX_FORCE, 50000.0),
            (parameters::PRELOAD_FORCE, 10.0),
            (parameters::APPROACH_SPEED, 50.0),
            (parameters::CONTACT_SPEED, 2.0),
            (parameters::RETURN_SPEED, 100.0),
            (servo::JOG_VELOCITY_SP, 50.0),
            (servo::STEP_DISTANCE, 1.0),
        ] {
            set_real(blocks, &descriptor, value);
        }

        for descriptor in [
            servo::SERVO_READY,
            servo::ENABLE,
            servo::MC_POWER,
            servo::REMOTE_MODE,
            servo::SAFETY_OK,
            servo::MOTION_ALLOWED,
            servo::MODE_CHANGE_OK,
            servo::AT_HOME,
            servo::HOME_POSITION,
            hmi::LAMP_READY,
        ] {
            set_bit(blocks, &descriptor, true);
        }
    }

    /// Advance the rig by one tick.
    ///
    /// # Arguments
    /// * `blocks` - Images of the data blocks.
    pub fn step(&mut self, blocks: &mut HashMap<u16, Vec<u8>>) {
        self.handle_commands(blocks);

        let is_enabled = get(blocks, &servo::ENABLE).as_bool();
        if self._status == 0 && is_enabled {
            self.jog(blocks);
        } else if (2..=5).contains(&self._status) {
            self.run_test(blocks);
        }

        self.publish(blocks);
    }

    fn handle_commands(&mut self, blocks: &mut HashMap<u16, Vec<u8>>) {
        if take(blocks, &results::TARE_COMMAND) {
            self._force_offset = self.force_raw();
        }

        if take(blocks, &command::ZERO_POSITION) {
            self._position = 0.0;
        }

        if take(blocks, &command::SERVO_RESET) {
            set_bit(blocks, &servo::SERVO_ERROR, false);
            set_bit(blocks, &servo::MC_ERROR, false);
        }

        if take(blocks, &command::TEST_HOME) && self._status == 0 {
            self._position = 0.0;
        }

        if take(blocks, &command::TEST_STOP) {
            self._status = 0;
        }

        if take(blocks, &command::TEST_START) && self._status == 0 {
            self._status = 2;
            self._data_points = 0;
            self._contact_position = self._position;
        }

        if take(blocks, &servo::STEP_FORWARD) {
            self._position += get(blocks, &servo::STEP_DISTANCE).as_f64();
        }

        if take(blocks, &servo::STEP_BACKWARD) {
            self._position -= get(blocks, &servo::STEP_DISTANCE).as_f64();
        }
    }

    fn jog(&mut self, blocks: &mut HashMap<u16, Vec<u8>>) {
        let velocity = get(blocks, &servo::JOG_VELOCITY_SP).as_f64();
        if get(blocks, &command::JOG_FORWARD).as_bool() {
            self._position += velocity * TIME_TICK;
        }
        if get(blocks, &command::JOG_BACKWARD).as_bool() {
            self._position -= velocity * TIME_TICK;
        }
    }

    fn run_test(&mut self, blocks: &mut HashMap<u16, Vec<u8>>) {
        let target = get(blocks, &parameters::DEFLECTION_TARGET).as_f64().max(0.1);
        let speed = get(blocks, &parameters::TEST_SPEED).as_f64();
        let deflection = self.deflection();

        self._status = match self._status {
            2 | 3 if deflection < target => {
                self._position += speed / 60.0 * TIME_TICK;
                self._data_points += 1;
                if self.deflection() < 0.1 * target {
                    2
                } else {
                    3
                }
            }
            2 | 3 => {
                self.report_results(blocks, target);
                4
            }
            4 => 5,
            _ => 0,
        };
    }

    fn report_results(&mut self, blocks: &mut HashMap<u16, Vec<u8>>, target: f64) {
        let force_kn = self.force() / 1000.0;
        let length_m = get(blocks, &parameters::PIPE_LENGTH).as_f64().max(1.0) / 1000.0;
        let diameter = get(blocks, &parameters::PIPE_DIAMETER).as_f64().max(1.0);
        let deflection_m = target / 1000.0;

        // Ring stiffness in kN/m2
        let stiffness = (0.0186 + 0.025 * target / diameter) * force_kn / (length_m * deflection_m);
        let sn_class = [16, 8, 4, 2]
            .into_iter()
            .find(|class| stiffness >= f64::from(*class))
            .unwrap_or(0);

        set_real(blocks, &results::FORCE_AT_TARGET, self.force());
        set_real(blocks, &results::RING_STIFFNESS, stiffness);
        set(blocks, &results::SN_CLASS, RegisterValue::Int(sn_class));
        set_bit(blocks, &results::TEST_PASSED, sn_class > 0);
    }

    fn deflection(&self) -> f64 {
        (self._position - self._contact_position).max(0.0)
    }

    fn force_raw(&self) -> f64 {
        PIPE_STIFFNESS * self.deflection()
    }

    fn force(&self) -> f64 {
        self.force_raw() - self._force_offset
    }

    fn publish(&self, blocks: &mut HashMap<u16, Vec<u8>>) {
        let is_active = (2..=5).contains(&self._status);
        let force = if is_active { self.force() } else { 0.0 };
        let deflection = if is_active { self.deflection() } else { 0.0 };
        let diameter = get(blocks, &parameters::PIPE_DIAMETER).as_f64().max(1.0);
        let target = get(blocks, &parameters::DEFLECTION_TARGET).as_f64().max(0.1);

        set_real(blocks, &results::ACTUAL_FORCE, force);
        set_real(blocks, &results::FORCE_FILTERED, force);
        set_real(blocks, &results::LOAD_CELL_ACTUAL, force);
        set_real(blocks, &results::LOAD_CELL_RAW, force + self._force_offset);
        set_real(blocks, &results::FORCE_KN, force / 1000.0);
        set_real(blocks, &results::ACTUAL_DEFLECTION, deflection);
        set_real(blocks, &results::DEFLECTION_PERCENT, deflection / diameter * 100.0);
        set_real(blocks, &results::POSITION_RAW, self._position);
        set_real(blocks, &results::POSITION_ACTUAL, self._position);
        set_real(blocks, &results::CONTACT_POSITION, self._contact_position);
        set_real(blocks, &servo::ACTUAL_POSITION, self._position);

        set(blocks, &results::TEST_STATUS, RegisterValue::Int(self._status));
        set(blocks, &results::TEST_STAGE, RegisterValue::Int(self._status));
        set(
            blocks,
            &results::DATA_POINT_COUNT,
            RegisterValue::Int(self._data_points),
        );
        set_bit(blocks, &results::RECORDING_ACTIVE, is_active);
        set_bit(blocks, &results::PRELOAD_REACHED, self._status >= 3);

        let progress = (deflection / target * 100.0).min(100.0) as i16;
        set(blocks, &hmi::TEST_PROGRESS, RegisterValue::Int(progress));
        set_bit(blocks, &hmi::LAMP_RUNNING, is_active);
        set_bit(blocks, &hmi::LAMP_READY, !is_active);
        set_bit(blocks, &servo::AT_HOME, self._position == 0.0);
        set_bit(blocks, &servo::HOME_POSITION, self._position == 0.0);
    }
}

impl Default for MockRig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::enums::DataBlock;

    fn create_rig() -> (MockRig, HashMap<u16, Vec<u8>>) {
        let mut blocks: HashMap<u16, Vec<u8>> = [
            DataBlock::Parameters,
            DataBlock::Results,
            DataBlock::Servo,
            DataBlock::Hmi,
        ]
        .iter()
        .map(|block| (block.number(), vec![0; block.size()]))
        .collect();

        let mut rig = MockRig::new();
        rig.init(&mut blocks);

        (rig, blocks)
    }

    #[test]
    fn test_init() {
        let (_, blocks) = create_rig();

        assert_eq!(get(&blocks, &parameters::TEST_SPEED), RegisterValue::Real(12.0));
        assert!(get(&blocks, &servo::REMOTE_MODE).as_bool());
    }

    #[test]
    fn test_jog() {
        let (mut rig, mut blocks) = create_rig();

        set_bit(&mut blocks, &command::JOG_FORWARD, true);
        rig.step(&mut blocks);

        assert_eq!(get(&blocks, &servo::ACTUAL_POSITION), RegisterValue::Real(5.0));
        assert!(!get(&blocks, &servo::AT_HOME).as_bool());
    }

    #[test]
    fn test_run_test() {
        let (mut rig, mut blocks) = create_rig();

        set_bit(&mut blocks, &command::TEST_START, true);

        let mut statuses = Vec::new();
        for _ in 0..400 {
            rig.step(&mut blocks);
            statuses.push(get(&blocks, &results::TEST_STATUS).as_f64() as i16);

            if statuses.ends_with(&[5, 0]) {
                break;
            }
        }

        assert_eq!(statuses.first(), Some(&2));
        assert!(statuses.ends_with(&[4, 5, 0]));
        assert!(statuses.contains(&3));

        // The start bit is cleared by the rig.
        assert!(!get(&blocks, &command::TEST_START).as_bool());

        assert!(get(&blocks, &results::RING_STIFFNESS).as_f64() > 0.0);
        assert!(get(&blocks, &results::TEST_PASSED).as_bool());
    }
}
