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
use serde::Serialize;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use crate::enums::{JogDirection, RejectReason};
use crate::error::CommandError;
use crate::plc::codec::{FieldDescriptor, RegisterValue};
use crate::plc::field_map::{command, results, servo};
use crate::plc::plc_link::PlcLink;

/// Result of a jog request. A rejection is a normal outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JogResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl JogResult {
    fn accepted() -> Self {
        Self {
            success: true,
            reason: None,
            message: None,
        }
    }

    fn rejected(reason: RejectReason) -> Self {
        Self {
            success: false,
            reason: Some(reason),
            message: Some(String::from(reason.describe())),
        }
    }
}

/// Bit of the jog direction.
fn jog_bit(direction: JogDirection) -> &'static FieldDescriptor {
    match direction {
        JogDirection::Forward => &command::JOG_FORWARD,
        JogDirection::Backward => &command::JOG_BACKWARD,
    }
}

/// Operator commands to the test rig.
pub struct CommandService {
    // Link to the PLC.
    _link: Arc<PlcLink>,
    // Direction of the active jog.
    _jog: Mutex<Option<JogDirection>>,
    // Number of the calls of stop_all_jog().
    _stop_count: AtomicUsize,
}

impl CommandService {
    /// Create a new command service.
    ///
    /// # Arguments
    /// * `link` - Link to the PLC.
    ///
    /// # Returns
    /// New command service.
    pub fn new(link: Arc<PlcLink>) -> Self {
        Self {
            _link: link,
            _jog: Mutex::new(None),
            _stop_count: AtomicUsize::new(0),
        }
    }

    fn jog_state(&self) -> MutexGuard<'_, Option<JogDirection>> {
        self._jog
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Direction of the active jog.
    pub fn active_jog(&self) -> Option<JogDirection> {
        *self.jog_state()
    }

    /// Number of the calls of stop_all_jog().
    pub fn stop_count(&self) -> usize {
        self._stop_count.load(Ordering::SeqCst)
    }

    /// Hold or release the jog. The remote mode is read before the jog is
    /// activated, and nothing is written in the local mode. The release is
    /// never rejected.
    ///
    /// # Arguments
    /// * `direction` - Jog direction.
    /// * `active` - Hold (true) or release (false).
    ///
    /// # Returns
    /// Jog result.
    pub fn jog(&self, direction: JogDirection, active: bool) -> JogResult {
        if !active {
            {
                let mut jog = self.jog_state();
                if *jog == Some(direction) {
                    *jog = None;
                }
            }

            return match self
                ._link
                .write_value(jog_bit(direction), RegisterValue::Bit(false))
            {
                Ok(()) => JogResult::accepted(),
                Err(error) => {
                    warn!("Failed to release the jog {}: {error}.", direction.as_ref());
                    JogResult::rejected(RejectReason::NotConnected)
                }
            };
        }

        // The jog state is not locked during the I/O. A stop_all_jog() in
        // the meantime shows up as a new stop count.
        let stop_count = self._stop_count.load(Ordering::SeqCst);

        match self._link.read_value(&servo::REMOTE_MODE) {
            Ok(value) if !value.as_bool() => {
                info!("Jog {} is rejected in the local mode.", direction.as_ref());
                return JogResult::rejected(RejectReason::LocalMode);
            }
            Ok(_) => {}
            Err(error) => {
                warn!("Failed to read the mode before the jog: {error}.");
                return JogResult::rejected(RejectReason::NotConnected);
            }
        }

        let result = self
            ._link
            .write_value(jog_bit(direction.opposite()), RegisterValue::Bit(false))
            .and_then(|_| {
                self._link
                    .write_value(jog_bit(direction), RegisterValue::Bit(true))
            });

        if let Err(error) = result {
            warn!("Failed to jog {}: {error}.", direction.as_ref());
            *self.jog_state() = None;

            return JogResult::rejected(RejectReason::NotConnected);
        }

        {
            let mut jog = self.jog_state();
            if self._stop_count.load(Ordering::SeqCst) == stop_count {
                *jog = Some(direction);
                debug!("Jog {} is active.", direction.as_ref());

                return JogResult::accepted();
            }
        }

        // The stop may have been written before the jog bit.
        warn!("Jog {} is stopped while it is activated.", direction.as_ref());
        if let Err(error) = self
            ._link
            .write_value(jog_bit(direction), RegisterValue::Bit(false))
        {
            debug!("Failed to release the jog {}: {error}.", direction.as_ref());
        }

        JogResult::rejected(RejectReason::StoppedWhileActivating)
    }

    /// Set the jog velocity.
    ///
    /// # Arguments
    /// * `velocity` - Jog velocity in mm/s.
    ///
    /// # Returns
    /// True if the velocity is written.
    pub fn set_jog_velocity(&self, velocity: f64) -> bool {
        match self
            ._link
            .write_value(&servo::JOG_VELOCITY_SP, RegisterValue::Real(velocity as f32))
        {
            Ok(()) => true,
            Err(error) => {
                warn!("Failed to set the jog velocity: {error}.");
                false
            }
        }
    }

    /// Release both jog directions. This never fails and can be called at
    /// any time.
    pub fn stop_all_jog(&self) {
        // Counted before the writes, so a jog being activated sees it.
        self._stop_count.fetch_add(1, Ordering::SeqCst);

        if let Some(direction) = self.jog_state().take() {
            info!("Stop the active jog {}.", direction.as_ref());
        }

        for direction in [JogDirection::Forward, JogDirection::Backward] {
            if let Err(error) = self
                ._link
                .write_value(jog_bit(direction), RegisterValue::Bit(false))
            {
                debug!("Failed to release the jog {}: {error}.", direction.as_ref());
            }
        }
    }

    fn write_bit(&self, descriptor: &FieldDescriptor, value: bool) -> Result<(), CommandError> {
        self._link
            .write_value(descriptor, RegisterValue::Bit(value))
            .map_err(|error| {
                warn!("Failed to write the {}: {error}.", descriptor.name);
                CommandError::from(error)
            })
    }

    /// Set the distance of one step.
    ///
    /// # Arguments
    /// * `distance` - Step distance in mm.
    pub fn set_step_distance(&self, distance: f64) -> Result<(), CommandError> {
        Ok(self
            ._link
            .write_value(&servo::STEP_DISTANCE, RegisterValue::Real(distance as f32))?)
    }

    /// Move the crosshead by one step.
    ///
    /// # Arguments
    /// * `direction` - Step direction.
    pub fn step(&self, direction: JogDirection) -> Result<(), CommandError> {
        match direction {
            JogDirection::Forward => self.write_bit(&servo::STEP_FORWARD, true),
            JogDirection::Backward => self.write_bit(&servo::STEP_BACKWARD, true),
        }
    }

    /// Start the test sequence.
    pub fn start_test(&self) -> Result<(), CommandError> {
        self.write_bit(&command::TEST_START, true)
    }

    /// Stop the test sequence.
    pub fn stop_test(&self) -> Result<(), CommandError> {
        self.write_bit(&command::TEST_STOP, true)
    }

    /// Move the crosshead to the home position.
    pub fn home(&self) -> Result<(), CommandError> {
        self.write_bit(&command::TEST_HOME, true)
    }

    /// Tare the load cell.
    pub fn tare(&self) -> Result<(), CommandError> {
        self.write_bit(&results::TARE_COMMAND, true)
    }

    /// Zero the position of the crosshead.
    pub fn zero_position(&self) -> Result<(), CommandError> {
        self.write_bit(&command::ZERO_POSITION, true)
    }

    /// Enable or disable the servo.
    ///
    /// # Arguments
    /// * `enable` - Enable or not.
    pub fn enable_servo(&self, enable: bool) -> Result<(), CommandError> {
        self.write_bit(&servo::ENABLE, enable)
    }

    /// Reset the servo error.
    pub fn reset_servo(&self) -> Result<(), CommandError> {
        self.write_bit(&command::SERVO_RESET, true)
    }

    /// Lock the upper clamp.
    pub fn lock_upper_clamp(&self) -> Result<(), CommandError> {
        self.write_bit(&servo::LOCK_UPPER, true)
    }

    /// Lock the lower clamp.
    pub fn lock_lower_clamp(&self) -> Result<(), CommandError> {
        self.write_bit(&servo::LOCK_LOWER, true)
    }

    /// Unlock both clamps.
    pub fn unlock_clamps(&self) -> Result<(), CommandError> {
        self.write_bit(&servo::LOCK_UPPER, false)?;
        self.write_bit(&servo::LOCK_LOWER, false)
    }

    /// Read the mode.
    ///
    /// # Returns
    /// Remote mode or not, and the mode change is allowed or not.
    pub fn get_mode(&self) -> Result<(bool, bool), CommandError> {
        let is_remote = self._link.read_value(&servo::REMOTE_MODE)?.as_bool();
        let can_change = self._link.read_value(&servo::MODE_CHANGE_OK)?.as_bool();

        Ok((is_remote, can_change))
    }

    /// Switch between the remote and local modes. The switch is rejected if
    /// the PLC does not allow the mode change.
    ///
    /// # Arguments
    /// * `remote` - Remote mode or not.
    pub fn set_mode(&self, remote: bool) -> Result<(), CommandError> {
        if !self._link.read_value(&servo::MODE_CHANGE_OK)?.as_bool() {
            info!("Mode change is locked by the PLC.");
            return Err(CommandError::Rejected(RejectReason::ModeChangeLocked));
        }

        self.write_bit(&servo::REMOTE_MODE, remote)?;

        // Leaving the remote mode must not leave a jog behind.
        if !remote {
            self.stop_all_jog();
        }

        Ok(())
    }

    /// Link to the PLC.
    pub fn link(&self) -> &Arc<PlcLink> {
        &self._link
    }
}
