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

use serde::Serialize;

use crate::constants::TEST_STATUS_UNKNOWN;
use crate::enums::CpuState;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForceData {
    // Raw load cell reading.
    pub raw: f64,
    // Load cell reading after the tare.
    pub actual: f64,
    pub filtered: f64,
    #[serde(rename = "kN")]
    pub kn: f64,
    #[serde(rename = "N")]
    pub n: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionData {
    pub raw: f64,
    // Crosshead position from the servo in mm.
    pub actual: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeflectionData {
    pub percent: f64,
    pub actual: f64,
    // Target deflection of the last parameter read in mm.
    pub target: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestData {
    pub status: i16,
    pub stage: i16,
    pub preload_reached: bool,
    pub recording: bool,
    pub progress: i16,
    pub passed: bool,
}

impl Default for TestData {
    fn default() -> Self {
        Self {
            status: TEST_STATUS_UNKNOWN,
            stage: 0,
            preload_reached: false,
            recording: false,
            progress: 0,
            passed: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultsData {
    pub ring_stiffness: f64,
    pub force_at_target: f64,
    pub sn_class: i16,
    pub contact_position: f64,
    pub data_points: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServoData {
    pub ready: bool,
    pub error: bool,
    pub enabled: bool,
    pub at_home: bool,
    pub mc_power: bool,
    pub mc_busy: bool,
    pub mc_error: bool,
    pub speed: f64,
    pub jog_velocity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepData {
    pub distance: f64,
    pub forward_cmd: bool,
    pub backward_cmd: bool,
    pub active: bool,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SafetyData {
    pub e_stop: bool,
    pub upper_limit: bool,
    pub lower_limit: bool,
    pub home: bool,
    pub ok: bool,
    pub motion_allowed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClampsData {
    pub upper: bool,
    pub lower: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModeData {
    pub remote: bool,
    pub can_change: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlarmData {
    pub active: bool,
    pub code: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LampsData {
    pub ready: bool,
    pub running: bool,
    pub error: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlcData {
    pub connected: bool,
    pub cpu_state: CpuState,
    pub ip: String,
}

/// Live data of one scheduler tick, decoded from the three polled data
/// blocks. A disconnected snapshot keeps the same shape with the default
/// values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveSnapshot {
    pub force: ForceData,
    pub position: PositionData,
    pub deflection: DeflectionData,
    pub test: TestData,
    pub results: ResultsData,
    pub servo: ServoData,
    pub step: StepData,
    pub safety: SafetyData,
    pub clamps: ClampsData,
    pub mode: ModeData,
    pub alarm: AlarmData,
    pub lamps: LampsData,
    pub connected: bool,
    pub plc: PlcData,
    // Deflection calculated from the test speed and the elapsed time in mm.
    // Only present while a test is running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculated_deflection: Option<f64>,
}

impl LiveSnapshot {
    /// Snapshot while the PLC is not reachable.
    ///
    /// # Arguments
    /// * `ip` - IP address of the PLC.
    ///
    /// # Returns
    /// Snapshot with the default values.
    pub fn disconnected(ip: &str) -> Self {
        Self {
            force: ForceData::default(),
            position: PositionData::default(),
            deflection: DeflectionData::default(),
            test: TestData::default(),
            results: ResultsData::default(),
            servo: ServoData::default(),
            step: StepData::default(),
            safety: SafetyData::default(),
            clamps: ClampsData::default(),
            mode: ModeData::default(),
            alarm: AlarmData::default(),
            lamps: LampsData::default(),
            connected: false,
            plc: PlcData {
                connected: false,
                cpu_state: CpuState::Unknown,
                ip: String::from(ip),
            },
            calculated_deflection: None,
        }
    }

    /// Copy of the snapshot annotated with the calculated deflection.
    ///
    /// # Arguments
    /// * `calculated_deflection` - Calculated deflection in mm.
    ///
    /// # Returns
    /// Annotated snapshot.
    pub fn with_calculated_deflection(&self, calculated_deflection: Option<f64>) -> Self {
        let mut snapshot = self.clone();
        snapshot.calculated_deflection = calculated_deflection;

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_disconnected() {
        let snapshot = LiveSnapshot::disconnected("192.168.0.1");

        assert!(!snapshot.connected);
        assert_eq!(snapshot.test.status, -1);
        assert_eq!(snapshot.plc.cpu_state, CpuState::Unknown);
        assert_eq!(snapshot.force, ForceData::default());
        assert!(!snapshot.safety.ok);
    }

    #[test]
    fn test_serialize() {
        let value = serde_json::to_value(LiveSnapshot::disconnected("10.0.0.2")).unwrap();

        assert_eq!(
            value["force"],
            json!({"raw": 0.0, "actual": 0.0, "filtered": 0.0, "kN": 0.0, "N": 0.0})
        );
        assert_eq!(
            value["plc"],
            json!({"connected": false, "cpu_state": "unknown", "ip": "10.0.0.2"})
        );
        assert_eq!(value["test"]["status"], json!(-1));
        assert!(value.get("calculated_deflection").is_none());
    }

    #[test]
    fn test_with_calculated_deflection() {
        let snapshot = LiveSnapshot::disconnected("10.0.0.2");
        let annotated = snapshot.with_calculated_deflection(Some(6.0));

        assert_eq!(annotated.calculated_deflection, Some(6.0));
        assert_eq!(snapshot.calculated_deflection, None);

        let value = serde_json::to_value(&annotated).unwrap();
        assert_eq!(value["calculated_deflection"], json!(6.0));
    }
}
