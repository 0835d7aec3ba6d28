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
use std::time::Instant;
use time::OffsetDateTime;

use crate::constants::SECOND_PER_MINUTE;
use crate::telemetry::snapshot::{LiveSnapshot, ResultsData, TestData};

/// Sample of an active test.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    // Elapsed time since the start in second.
    pub timestamp: f64,
    // Force in kN.
    pub force: f64,
    // Calculated deflection in mm.
    pub deflection: f64,
    // Crosshead position in mm.
    pub position: f64,
}

/// Test run accumulated while the test is active.
#[derive(Debug, Clone)]
pub struct TestRun {
    // Monotonic start instant.
    _started: Instant,
    // Wall-clock start time.
    _start_time: OffsetDateTime,
    // Test speed in mm/min, captured at the start.
    _test_speed: f64,
    _data_points: Vec<DataPoint>,
}

impl TestRun {
    /// Create a new test run.
    ///
    /// # Arguments
    /// * `test_speed` - Test speed in mm/min.
    /// * `started` - Start instant.
    ///
    /// # Returns
    /// New test run without data points.
    pub fn new(test_speed: f64, started: Instant) -> Self {
        Self {
            _started: started,
            _start_time: OffsetDateTime::now_utc(),
            _test_speed: test_speed,
            _data_points: Vec::new(),
        }
    }

    pub fn test_speed(&self) -> f64 {
        self._test_speed
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self._start_time
    }

    pub fn data_points(&self) -> &[DataPoint] {
        &self._data_points
    }

    /// Elapsed time since the start in second.
    ///
    /// # Arguments
    /// * `now` - Current instant.
    pub fn elapsed(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self._started).as_secs_f64()
    }

    /// Deflection calculated from the test speed.
    ///
    /// # Arguments
    /// * `elapsed` - Elapsed time in second.
    ///
    /// # Returns
    /// Calculated deflection in mm.
    pub fn calculated_deflection(&self, elapsed: f64) -> f64 {
        self._test_speed / SECOND_PER_MINUTE * elapsed
    }

    /// Append a data point of the snapshot.
    ///
    /// # Arguments
    /// * `snapshot` - Live snapshot.
    /// * `now` - Current instant.
    ///
    /// # Returns
    /// Calculated deflection in mm.
    pub fn record(&mut self, snapshot: &LiveSnapshot, now: Instant) -> f64 {
        let elapsed = self.elapsed(now);
        let deflection = self.calculated_deflection(elapsed);

        self._data_points.push(DataPoint {
            timestamp: elapsed,
            force: snapshot.force.kn,
            deflection,
            position: snapshot.position.actual,
        });

        deflection
    }

    /// Finalize the run with the final snapshot.
    ///
    /// # Arguments
    /// * `snapshot` - Final snapshot.
    ///
    /// # Returns
    /// Finished run.
    pub fn finish(self, snapshot: &LiveSnapshot) -> FinishedRun {
        FinishedRun {
            start_time: self._start_time,
            test_speed: self._test_speed,
            data_points: self._data_points,
            results: snapshot.results.clone(),
            test: snapshot.test.clone(),
        }
    }
}

/// Test run after the completion.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedRun {
    pub start_time: OffsetDateTime,
    pub test_speed: f64,
    pub data_points: Vec<DataPoint>,
    // Results and status of the final snapshot.
    pub results: ResultsData,
    pub test: TestData,
}

impl FinishedRun {
    /// Test is passed or not.
    pub fn passed(&self) -> bool {
        self.test.passed
    }

    /// Final test status.
    pub fn final_status(&self) -> i16 {
        self.test.status
    }
}
