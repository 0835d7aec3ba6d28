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

use serde_json::{json, Value};

use crate::enums::{JogDirection, RejectReason};
use crate::telemetry::snapshot::{LiveSnapshot, ResultsData, TestData};

pub struct Event;
impl Event {
    /// Get the message of the live data.
    ///
    /// # Arguments
    /// * `snapshot` - Live snapshot.
    ///
    /// # Returns
    /// The message of the live data.
    pub fn get_message_live_data(snapshot: &LiveSnapshot) -> Value {
        let mut message = json!({"id": "liveData"});
        if let (Some(map), Ok(Value::Object(data))) =
            (message.as_object_mut(), serde_json::to_value(snapshot))
        {
            map.extend(data);
        }

        message
    }

    /// Get the message that the PLC link is restored.
    ///
    /// # Arguments
    /// * `ip` - IP address of the PLC.
    ///
    /// # Returns
    /// The message that the PLC link is restored.
    pub fn get_message_connectivity_restored(ip: &str) -> Value {
        json!({
            "id": "connectivityRestored",
            "ip": ip,
        })
    }

    /// Get the message that the PLC link is lost.
    ///
    /// # Arguments
    /// * `ip` - IP address of the PLC.
    ///
    /// # Returns
    /// The message that the PLC link is lost.
    pub fn get_message_connectivity_lost(ip: &str) -> Value {
        json!({
            "id": "connectivityLost",
            "ip": ip,
        })
    }

    /// Get the message that the test is complete.
    ///
    /// # Arguments
    /// * `test_id` - Identifier of the saved record. None if the record is
    /// not saved.
    /// * `results` - Results of the final snapshot.
    /// * `test` - Test status of the final snapshot.
    ///
    /// # Returns
    /// The message that the test is complete.
    pub fn get_message_test_complete(
        test_id: Option<i64>,
        results: &ResultsData,
        test: &TestData,
    ) -> Value {
        json!({
            "id": "testComplete",
            "test_id": test_id,
            "results": results,
            "test": test,
        })
    }

    /// Get the message that the jog is rejected.
    ///
    /// # Arguments
    /// * `direction` - Jog direction.
    /// * `reason` - Reason of the rejection.
    ///
    /// # Returns
    /// The message that the jog is rejected.
    pub fn get_message_jog_rejected(direction: JogDirection, reason: RejectReason) -> Value {
        json!({
            "id": "jogRejected",
            "direction": direction,
            "reason": reason,
            "message": reason.describe(),
        })
    }

    /// Get the message of the connection status of the PLC.
    ///
    /// # Arguments
    /// * `is_connected` - PLC is connected or not.
    ///
    /// # Returns
    /// The message of the connection status.
    pub fn get_message_connection_status(is_connected: bool) -> Value {
        json!({
            "id": "connectionStatus",
            "connected": is_connected,
        })
    }
}
