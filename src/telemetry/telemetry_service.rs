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

use log::{error, info, warn};
use std::sync::{Arc, Mutex};

use crate::enums::DataBlock;
use crate::error::{CodecError, LinkError, WriteError};
use crate::plc::codec::{FieldDescriptor, RegisterValue};
use crate::plc::field_map::{hmi, results, servo};
use crate::plc::plc_link::PlcLink;
use crate::plc::register_block::RegisterBlock;
use crate::telemetry::parameters::{
    ParameterUpdate, ParameterWriteReport, TestParameters, TestResults,
};
use crate::telemetry::snapshot::{
    AlarmData, ClampsData, DeflectionData, ForceData, LampsData, LiveSnapshot, ModeData, PlcData,
    PositionData, ResultsData, SafetyData, ServoData, StepData, TestData,
};

/// Assemble the live data and access the test parameters in the PLC. The
/// reads never fail and degrade to the default values.
pub struct TelemetryService {
    // Link to the PLC.
    _link: Arc<PlcLink>,
    // Target deflection of the last parameter read in mm.
    _deflection_target: Mutex<f64>,
}

impl TelemetryService {
    /// Create a new telemetry service.
    ///
    /// # Arguments
    /// * `link` - Link to the PLC.
    ///
    /// # Returns
    /// New telemetry service.
    pub fn new(link: Arc<PlcLink>) -> Self {
        Self {
            _link: link,
            _deflection_target: Mutex::new(0.0),
        }
    }

    /// Link to the PLC.
    pub fn link(&self) -> &Arc<PlcLink> {
        &self._link
    }

    /// Cached target deflection in mm.
    pub fn deflection_target(&self) -> f64 {
        *self
            ._deflection_target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_deflection_target(&self, value: f64) {
        *self
            ._deflection_target
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = value;
    }

    /// Poll the live data with one read of each of the results, servo, and
    /// HMI data blocks.
    ///
    /// # Returns
    /// Live snapshot. The disconnected snapshot if any read fails.
    pub fn poll_snapshot(&self) -> LiveSnapshot {
        let ip = self._link.ip();
        if !self._link.is_connected() {
            return LiveSnapshot::disconnected(ip);
        }

        let blocks = self
            ._link
            .read_data_block(DataBlock::Results)
            .and_then(|db_results| {
                let db_servo = self._link.read_data_block(DataBlock::Servo)?;
                let db_hmi = self._link.read_data_block(DataBlock::Hmi)?;

                Ok((db_results, db_servo, db_hmi))
            });

        let (db_results, db_servo, db_hmi) = match blocks {
            Ok(blocks) => blocks,
            Err(link_error) => {
                warn!("Failed to poll the live data: {link_error}.");
                return LiveSnapshot::disconnected(ip);
            }
        };

        match self.decode_snapshot(&db_results, &db_servo, &db_hmi) {
            Ok(snapshot) => snapshot,
            Err(codec_error) => {
                error!("Failed to decode the live data: {codec_error}.");
                debug_assert!(false, "{codec_error}");

                LiveSnapshot::disconnected(ip)
            }
        }
    }

    fn decode_snapshot(
        &self,
        db_results: &RegisterBlock,
        db_servo: &RegisterBlock,
        db_hmi: &RegisterBlock,
    ) -> Result<LiveSnapshot, CodecError> {
        let real = |block: &RegisterBlock, descriptor: &FieldDescriptor| -> Result<f64, CodecError> {
            Ok(block.real(descriptor)? as f64)
        };

        Ok(LiveSnapshot {
            force: ForceData {
                raw: real(db_results, &results::LOAD_CELL_RAW)?,
                actual: real(db_results, &results::LOAD_CELL_ACTUAL)?,
                filtered: real(db_results, &results::FORCE_FILTERED)?,
                kn: real(db_results, &results::FORCE_KN)?,
                n: real(db_results, &results::ACTUAL_FORCE)?,
            },
            position: PositionData {
                raw: real(db_results, &results::POSITION_RAW)?,
                actual: real(db_servo, &servo::ACTUAL_POSITION)?,
            },
            deflection: DeflectionData {
                percent: real(db_results, &results::DEFLECTION_PERCENT)?,
                actual: real(db_results, &results::ACTUAL_DEFLECTION)?,
                target: self.deflection_target(),
            },
            test: TestData {
                status: db_results.int(&results::TEST_STATUS)?,
                stage: db_results.int(&results::TEST_STAGE)?,
                preload_reached: db_results.bit(&results::PRELOAD_REACHED)?,
                recording: db_results.bit(&results::RECORDING_ACTIVE)?,
                progress: db_hmi.int(&hmi::TEST_PROGRESS)?,
                passed: db_results.bit(&results::TEST_PASSED)?,
            },
            results: ResultsData {
                ring_stiffness: real(db_results, &results::RING_STIFFNESS)?,
                force_at_target: real(db_results, &results::FORCE_AT_TARGET)?,
                sn_class: db_results.int(&results::SN_CLASS)?,
                contact_position: real(db_results, &results::CONTACT_POSITION)?,
                data_points: db_results.int(&results::DATA_POINT_COUNT)?,
            },
            servo: ServoData {
                ready: db_servo.bit(&servo::SERVO_READY)?,
                error: db_servo.bit(&servo::SERVO_ERROR)?,
                enabled: db_servo.bit(&servo::ENABLE)?,
                at_home: db_servo.bit(&servo::AT_HOME)?,
                mc_power: db_servo.bit(&servo::MC_POWER)?,
                mc_busy: db_servo.bit(&servo::MC_BUSY)?,
                mc_error: db_servo.bit(&servo::MC_ERROR)?,
                speed: real(db_servo, &servo::ACTUAL_SPEED)?,
                jog_velocity: real(db_servo, &servo::JOG_VELOCITY_SP)?,
            },
            step: StepData {
                distance: real(db_servo, &servo::STEP_DISTANCE)?,
                forward_cmd: db_servo.bit(&servo::STEP_FORWARD)?,
                backward_cmd: db_servo.bit(&servo::STEP_BACKWARD)?,
                active: db_servo.bit(&servo::STEP_ACTIVE)?,
                done: db_servo.bit(&servo::STEP_DONE)?,
            },
            safety: SafetyData {
                e_stop: db_servo.bit(&servo::ESTOP_ACTIVE)?,
                upper_limit: db_servo.bit(&servo::UPPER_LIMIT)?,
                lower_limit: db_servo.bit(&servo::LOWER_LIMIT)?,
                home: db_servo.bit(&servo::HOME_POSITION)?,
                ok: db_servo.bit(&servo::SAFETY_OK)?,
                motion_allowed: db_servo.bit(&servo::MOTION_ALLOWED)?,
            },
            clamps: ClampsData {
                upper: db_servo.bit(&servo::LOCK_UPPER)?,
                lower: db_servo.bit(&servo::LOCK_LOWER)?,
            },
            mode: ModeData {
                remote: db_servo.bit(&servo::REMOTE_MODE)?,
                can_change: db_servo.bit(&servo::MODE_CHANGE_OK)?,
            },
            alarm: AlarmData {
                active: db_hmi.bit(&hmi::ALARM_ACTIVE)?,
                code: db_hmi.int(&hmi::ALARM_CODE)?,
            },
            lamps: LampsData {
                ready: db_hmi.bit(&hmi::LAMP_READY)?,
                running: db_hmi.bit(&hmi::LAMP_RUNNING)?,
                error: db_hmi.bit(&hmi::LAMP_ERROR)?,
            },
            connected: true,
            plc: PlcData {
                connected: true,
                cpu_state: self._link.run_state(),
                ip: String::from(self._link.ip()),
            },
            calculated_deflection: None,
        })
    }

    /// Read the test parameters with one read of the parameter block. The
    /// cached target deflection is refreshed.
    ///
    /// # Returns
    /// Test parameters. The defaults if the PLC is not readable.
    pub fn get_parameters(&self) -> TestParameters {
        if !self._link.is_connected() {
            return TestParameters::default();
        }

        match self._link.read_data_block(DataBlock::Parameters) {
            Ok(block) => {
                let values = TestParameters::from_block(&block);
                self.set_deflection_target(values.deflection_target);

                values
            }
            Err(link_error) => {
                warn!("Failed to read the test parameters: {link_error}.");
                TestParameters::default()
            }
        }
    }

    /// Write the test parameters. Each field is written independently, so a
    /// failed field does not stop the others. The cached target deflection is
    /// refreshed afterwards.
    ///
    /// # Arguments
    /// * `update` - Parameters to write.
    ///
    /// # Returns
    /// Written and failed fields, or an error if the PLC is disconnected.
    pub fn set_parameters(
        &self,
        update: &ParameterUpdate,
    ) -> Result<ParameterWriteReport, WriteError> {
        if !self._link.is_connected() {
            return Err(WriteError::Disconnected);
        }

        let mut report = ParameterWriteReport::default();
        for (descriptor, value) in update.fields() {
            match self
                ._link
                .write_value(&descriptor, RegisterValue::Real(value as f32))
            {
                Ok(()) => report.written.push(String::from(descriptor.name)),
                Err(link_error) => {
                    warn!("Failed to write the {}: {link_error}.", descriptor.name);
                    report.failed.push(String::from(descriptor.name));
                }
            }
        }

        info!(
            "Parameters written: {:?}, failed: {:?}.",
            report.written, report.failed
        );

        // The PLC derives the target deflection from the written values.
        if !report.written.is_empty() {
            self.get_parameters();
        }

        Ok(report)
    }

    /// Read the results of the last test with one read of the results block.
    ///
    /// # Returns
    /// Test results. Zeros if the PLC is not readable.
    pub fn get_test_results(&self) -> TestResults {
        if !self._link.is_connected() {
            return TestResults::default();
        }

        let decoded = self
            ._link
            .read_data_block(DataBlock::Results)
            .and_then(|block| Ok(Self::decode_results(&block)?));

        match decoded {
            Ok(values) => values,
            Err(LinkError::Codec(codec_error)) => {
                error!("Failed to decode the test results: {codec_error}.");
                debug_assert!(false, "{codec_error}");

                TestResults::default()
            }
            Err(link_error) => {
                warn!("Failed to read the test results: {link_error}.");
                TestResults::default()
            }
        }
    }

    fn decode_results(block: &RegisterBlock) -> Result<TestResults, CodecError> {
        Ok(TestResults {
            ring_stiffness: block.real(&results::RING_STIFFNESS)? as f64,
            force_at_target: block.real(&results::FORCE_AT_TARGET)? as f64,
            sn_class: block.int(&results::SN_CLASS)?,
            test_passed: block.bit(&results::TEST_PASSED)?,
            deflection_percent: block.real(&results::DEFLECTION_PERCENT)? as f64,
        })
    }
}
