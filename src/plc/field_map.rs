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

//! Field table of the data blocks in the PLC. The table is the binary
//! compatibility surface with the PLC program and every entry is checked
//! against the block sizes at compile time.

use crate::enums::DataBlock::{Hmi, Parameters, Results, Servo};
use crate::plc::codec::FieldDescriptor;

/// Test parameters (DB1).
pub mod parameters {
    use super::*;

    pub const PIPE_DIAMETER: FieldDescriptor = FieldDescriptor::real("pipe_diameter", Parameters, 0);
    pub const PIPE_LENGTH: FieldDescriptor = FieldDescriptor::real("pipe_length", Parameters, 4);
    pub const DEFLECTION_PERCENT: FieldDescriptor =
        FieldDescriptor::real("deflection_percent", Parameters, 8);
    // Computed by the PLC.
    pub const DEFLECTION_TARGET: FieldDescriptor =
        FieldDescriptor::real("deflection_target", Parameters, 12);
    pub const TEST_SPEED: FieldDescriptor = FieldDescriptor::real("test_speed", Parameters, 16);
    pub const MAX_STROKE: FieldDescriptor = FieldDescriptor::real("max_stroke", Parameters, 20);
    pub const MAX_FORCE: FieldDescriptor = FieldDescriptor::real("max_force", Parameters, 24);
    pub const PRELOAD_FORCE: FieldDescriptor = FieldDescriptor::real("preload_force", Parameters, 38);
    pub const APPROACH_SPEED: FieldDescriptor =
        FieldDescriptor::real("approach_speed", Parameters, 42);
    pub const CONTACT_SPEED: FieldDescriptor = FieldDescriptor::real("contact_speed", Parameters, 46);
    pub const RETURN_SPEED: FieldDescriptor = FieldDescriptor::real("return_speed", Parameters, 50);
}

/// Test results and measurements (DB2).
pub mod results {
    use super::*;

    pub const ACTUAL_FORCE: FieldDescriptor = FieldDescriptor::real("actual_force", Results, 0);
    pub const ACTUAL_DEFLECTION: FieldDescriptor =
        FieldDescriptor::real("actual_deflection", Results, 4);
    pub const DEFLECTION_PERCENT: FieldDescriptor =
        FieldDescriptor::real("result_deflection_percent", Results, 8);
    pub const FORCE_AT_TARGET: FieldDescriptor = FieldDescriptor::real("force_at_target", Results, 12);
    pub const RING_STIFFNESS: FieldDescriptor = FieldDescriptor::real("ring_stiffness", Results, 16);
    pub const SN_CLASS: FieldDescriptor = FieldDescriptor::int("sn_class", Results, 20);
    pub const TEST_STATUS: FieldDescriptor = FieldDescriptor::int("test_status", Results, 22);
    pub const TEST_PASSED: FieldDescriptor = FieldDescriptor::bit("test_passed", Results, 24, 0);
    pub const FORCE_FILTERED: FieldDescriptor = FieldDescriptor::real("force_filtered", Results, 36);
    pub const FORCE_KN: FieldDescriptor = FieldDescriptor::real("force_kn", Results, 44);
    pub const LOAD_CELL_RAW: FieldDescriptor = FieldDescriptor::real("load_cell_raw", Results, 48);
    pub const LOAD_CELL_ACTUAL: FieldDescriptor =
        FieldDescriptor::real("load_cell_actual", Results, 56);
    pub const TARE_COMMAND: FieldDescriptor = FieldDescriptor::bit("tare_command", Results, 60, 0);
    pub const POSITION_RAW: FieldDescriptor = FieldDescriptor::real("position_raw", Results, 62);
    pub const POSITION_ACTUAL: FieldDescriptor = FieldDescriptor::real("position_actual", Results, 70);
    pub const TEST_STAGE: FieldDescriptor = FieldDescriptor::int("test_stage", Results, 74);
    pub const PRELOAD_REACHED: FieldDescriptor =
        FieldDescriptor::bit("preload_reached", Results, 76, 0);
    pub const CONTACT_POSITION: FieldDescriptor =
        FieldDescriptor::real("contact_position", Results, 78);
    pub const DATA_POINT_COUNT: FieldDescriptor = FieldDescriptor::int("data_point_count", Results, 82);
    pub const RECORDING_ACTIVE: FieldDescriptor =
        FieldDescriptor::bit("recording_active", Results, 84, 0);
}

/// Servo, motion and safety status (DB3).
pub mod servo {
    use super::*;

    pub const ENABLE: FieldDescriptor = FieldDescriptor::bit("servo_enable", Servo, 0, 0);
    pub const SERVO_READY: FieldDescriptor = FieldDescriptor::bit("servo_ready", Servo, 0, 7);
    pub const SERVO_ERROR: FieldDescriptor = FieldDescriptor::bit("servo_error", Servo, 1, 0);
    pub const AT_HOME: FieldDescriptor = FieldDescriptor::bit("at_home", Servo, 1, 1);
    pub const ACTUAL_POSITION: FieldDescriptor = FieldDescriptor::real("actual_position", Servo, 2);
    pub const ACTUAL_SPEED: FieldDescriptor = FieldDescriptor::real("actual_speed", Servo, 10);
    pub const LOCK_UPPER: FieldDescriptor = FieldDescriptor::bit("lock_upper", Servo, 14, 0);
    pub const LOCK_LOWER: FieldDescriptor = FieldDescriptor::bit("lock_lower", Servo, 14, 1);
    pub const MC_POWER: FieldDescriptor = FieldDescriptor::bit("mc_power", Servo, 20, 0);
    pub const MC_BUSY: FieldDescriptor = FieldDescriptor::bit("mc_busy", Servo, 20, 1);
    pub const MC_ERROR: FieldDescriptor = FieldDescriptor::bit("mc_error", Servo, 20, 2);
    pub const REMOTE_MODE: FieldDescriptor = FieldDescriptor::bit("remote_mode", Servo, 25, 0);
    pub const ESTOP_ACTIVE: FieldDescriptor = FieldDescriptor::bit("estop_active", Servo, 25, 1);
    pub const UPPER_LIMIT: FieldDescriptor = FieldDescriptor::bit("upper_limit", Servo, 25, 2);
    pub const LOWER_LIMIT: FieldDescriptor = FieldDescriptor::bit("lower_limit", Servo, 25, 3);
    pub const HOME_POSITION: FieldDescriptor = FieldDescriptor::bit("home_position", Servo, 25, 4);
    pub const SAFETY_OK: FieldDescriptor = FieldDescriptor::bit("safety_ok", Servo, 25, 5);
    pub const MOTION_ALLOWED: FieldDescriptor = FieldDescriptor::bit("motion_allowed", Servo, 25, 6);
    pub const JOG_VELOCITY_SP: FieldDescriptor = FieldDescriptor::real("jog_velocity_sp", Servo, 26);
    pub const MODE_CHANGE_OK: FieldDescriptor = FieldDescriptor::bit("mode_change_ok", Servo, 30, 0);
    pub const STEP_DISTANCE: FieldDescriptor = FieldDescriptor::real("step_distance", Servo, 32);
    pub const STEP_FORWARD: FieldDescriptor = FieldDescriptor::bit("step_forward", Servo, 36, 0);
    pub const STEP_BACKWARD: FieldDescriptor = FieldDescriptor::bit("step_backward", Servo, 36, 1);
    pub const STEP_ACTIVE: FieldDescriptor = FieldDescriptor::bit("step_active", Servo, 36, 2);
    pub const STEP_DONE: FieldDescriptor = FieldDescriptor::bit("step_done", Servo, 36, 3);
}

/// Operator panel, alarm and lamps (DB4).
pub mod hmi {
    use super::*;

    pub const ALARM_ACTIVE: FieldDescriptor = FieldDescriptor::bit("alarm_active", Hmi, 2, 2);
    pub const ALARM_CODE: FieldDescriptor = FieldDescriptor::int("alarm_code", Hmi, 4);
    pub const LAMP_READY: FieldDescriptor = FieldDescriptor::bit("lamp_ready", Hmi, 59, 3);
    pub const LAMP_RUNNING: FieldDescriptor = FieldDescriptor::bit("lamp_running", Hmi, 59, 4);
    pub const LAMP_ERROR: FieldDescriptor = FieldDescriptor::bit("lamp_error", Hmi, 59, 5);
    pub const TEST_PROGRESS: FieldDescriptor = FieldDescriptor::int("test_progress", Hmi, 62);
}

/// Command bits written by the operator commands. They share the data
/// blocks with the status fields.
pub mod command {
    use super::*;

    pub const JOG_FORWARD: FieldDescriptor = FieldDescriptor::bit("jog_forward", Servo, 0, 1);
    pub const JOG_BACKWARD: FieldDescriptor = FieldDescriptor::bit("jog_backward", Servo, 0, 2);
    pub const SERVO_RESET: FieldDescriptor = FieldDescriptor::bit("servo_reset", Servo, 0, 3);
    pub const TEST_START: FieldDescriptor = FieldDescriptor::bit("test_start", Hmi, 0, 0);
    pub const TEST_STOP: FieldDescriptor = FieldDescriptor::bit("test_stop", Hmi, 0, 1);
    pub const TEST_HOME: FieldDescriptor = FieldDescriptor::bit("test_home", Hmi, 0, 2);
    pub const ZERO_POSITION: FieldDescriptor = FieldDescriptor::bit("zero_position", Results, 60, 1);
}

/// All the fields in the data blocks.
pub const FIELD_MAP: &[FieldDescriptor] = &[
    parameters::PIPE_DIAMETER,
    parameters::PIPE_LENGTH,
    parameters::DEFLECTION_PERCENT,
    parameters::DEFLECTION_TARGET,
    parameters::TEST_SPEED,
    parameters::MAX_STROKE,
    parameters::MAX_FORCE,
    parameters::PRELOAD_FORCE,
    parameters::APPROACH_SPEED,
    parameters::CONTACT_SPEED,
    parameters::RETURN_SPEED,
    results::ACTUAL_FORCE,
    results::ACTUAL_DEFLECTION,
    results::DEFLECTION_PERCENT,
    results::FORCE_AT_TARGET,
    results::RING_STIFFNESS,
    results::SN_CLASS,
    results::TEST_STATUS,
    results::TEST_PASSED,
    results::FORCE_FILTERED,
    results::FORCE_KN,
    results::LOAD_CELL_RAW,
    results::LOAD_CELL_ACTUAL,
    results::TARE_COMMAND,
    results::POSITION_RAW,
    results::POSITION_ACTUAL,
    results::TEST_STAGE,
    results::PRELOAD_REACHED,
    results::CONTACT_POSITION,
    results::DATA_POINT_COUNT,
    results::RECORDING_ACTIVE,
    servo::ENABLE,
    servo::SERVO_READY,
    servo::SERVO_ERROR,
    servo::AT_HOME,
    servo::ACTUAL_POSITION,
    servo::ACTUAL_SPEED,
    servo::LOCK_UPPER,
    servo::LOCK_LOWER,
    servo::MC_POWER,
    servo::MC_BUSY,
    servo::MC_ERROR,
    servo::REMOTE_MODE,
    servo::ESTOP_ACTIVE,
    servo::UPPER_LIMIT,
    servo::LOWER_LIMIT,
    servo::HOME_POSITION,
    servo::SAFETY_OK,
    servo::MOTION_ALLOWED,
    servo::JOG_VELOCITY_SP,
    servo::MODE_CHANGE_OK,
    servo::STEP_DISTANCE,
    servo::STEP_FORWARD,
    servo::STEP_BACKWARD,
    servo::STEP_ACTIVE,
    servo::STEP_DONE,
    hmi::ALARM_ACTIVE,
    hmi::ALARM_CODE,
    hmi::LAMP_READY,
    hmi::LAMP_RUNNING,
    hmi::LAMP_ERROR,
    hmi::TEST_PROGRESS,
    command::JOG_FORWARD,
    command::JOG_BACKWARD,
    command::SERVO_RESET,
    command::TEST_START,
    command::TEST_STOP,
    command::TEST_HOME,
    command::ZERO_POSITION,
];

/// Check every field is inside its data block with a valid bit index.
///
/// # Arguments
/// * `fields` - Field descriptors.
///
/// # Returns
/// True if all the fields are valid.
pub const fn validate(fields: &[FieldDescriptor]) -> bool {
    let mut idx = 0;
    while idx < fields.len() {
        if !fields[idx].is_valid() {
            return false;
        }
        idx += 1;
    }

    true
}

const _: () = assert!(validate(FIELD_MAP), "Field map exceeds the data block bounds.");

/// Look up the field by the semantic name.
///
/// # Arguments
/// * `name` - Name of the field.
///
/// # Returns
/// Field descriptor if found.
pub fn lookup(name: &str) -> Option<&'static FieldDescriptor> {
    FIELD_MAP.iter().find(|field| field.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use crate::enums::{DataBlock, ValueKind};

    #[test]
    fn test_validate() {
        assert!(validate(FIELD_MAP));

        let fields = [
            parameters::PIPE_DIAMETER,
            FieldDescriptor::real("bad", DataBlock::Parameters, 52),
        ];
        assert!(!validate(&fields));

        let fields = [FieldDescriptor::bit("bad", DataBlock::Hmi, 0, 8)];
        assert!(!validate(&fields));
    }

    #[test]
    fn test_unique_names() {
        let names: HashSet<&str> = FIELD_MAP.iter().map(|field| field.name).collect();

        assert_eq!(names.len(), FIELD_MAP.len());
    }

    #[test]
    fn test_no_overlap() {
        // Bits may share a byte, but the words should not overlap anything.
        for (idx, field) in FIELD_MAP.iter().enumerate() {
            if field.kind == ValueKind::Bit {
                continue;
            }

            let range = field.offset..(field.offset + field.size());
            for other in FIELD_MAP.iter().skip(idx + 1) {
                if other.block != field.block {
                    continue;
                }

                assert!(
                    !range.contains(&other.offset),
                    "{} overlaps {}",
                    field.name,
                    other.name
                );
            }
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("remote_mode"), Some(&servo::REMOTE_MODE));
        assert_eq!(lookup("test_status").map(|field| field.offset), Some(22));
        assert_eq!(lookup("nothing"), None);
    }

    #[test]
    fn test_wire_addresses() {
        assert_eq!((servo::SERVO_READY.offset, servo::SERVO_READY.bit), (0, Some(7)));
        assert_eq!((servo::ESTOP_ACTIVE.offset, servo::ESTOP_ACTIVE.bit), (25, Some(1)));
        assert_eq!((hmi::LAMP_ERROR.offset, hmi::LAMP_ERROR.bit), (59, Some(5)));
        assert_eq!(results::RECORDING_ACTIVE.offset, 84);
        assert_eq!(parameters::RETURN_SPEED.offset, 50);
    }
}
