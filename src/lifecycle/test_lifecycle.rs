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

use log::info;
use std::time::Instant;

use crate::constants::{TEST_STATUS_ACTIVE_MAX, TEST_STATUS_ACTIVE_MIN};
use crate::lifecycle::test_run::{FinishedRun, TestRun};
use crate::telemetry::snapshot::LiveSnapshot;

/// Transition of the test status between two consecutive ticks.
#[derive(Debug, PartialEq, Clone, Copy, Eq)]
pub enum Transition {
    // Status crosses from below the active range into it.
    Start,
    // Active test continues.
    Sample,
    // Active test ends.
    Complete,
    // Nothing to do.
    Idle,
}

fn is_active(status: i16) -> bool {
    (TEST_STATUS_ACTIVE_MIN..=TEST_STATUS_ACTIVE_MAX).contains(&status)
}

/// Decide the transition from the previous and current test status. Every
/// change of the status is taken literally without any debounce.
///
/// # Arguments
/// * `previous` - Test status of the previous tick.
/// * `current` - Test status of the current tick.
/// * `has_run` - A test run exists or not. A run that survives a status
/// outside the active range continues when the status returns to it.
///
/// # Returns
/// Transition.
pub fn transition(previous: i16, current: i16, has_run: bool) -> Transition {
    // Only the cleared state accepts a new start.
    if !has_run {
        if previous < TEST_STATUS_ACTIVE_MIN && current >= TEST_STATUS_ACTIVE_MIN {
            return Transition::Start;
        }

        return Transition::Idle;
    }

    if is_active(current) {
        return Transition::Sample;
    }

    if is_active(previous)
        && current != previous
        && (current == 0 || current > TEST_STATUS_ACTIVE_MAX)
    {
        return Transition::Complete;
    }

    Transition::Idle
}

/// Result of one observed snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub transition: Transition,
    // Calculated deflection in mm while the test is active.
    pub calculated_deflection: Option<f64>,
    // Finished run on the completion.
    pub finished: Option<FinishedRun>,
}

/// Test lifecycle inferred from the polled test status. Only the session
/// scheduler owns and updates it.
pub struct TestLifecycle {
    _previous_status: i16,
    _run: Option<TestRun>,
}

impl TestLifecycle {
    /// Create a new test lifecycle in the idle status.
    pub fn new() -> Self {
        Self {
            _previous_status: 0,
            _run: None,
        }
    }

    /// Test run in progress.
    pub fn run(&self) -> Option<&TestRun> {
        self._run.as_ref()
    }

    pub fn previous_status(&self) -> i16 {
        self._previous_status
    }

    /// Observe the snapshot of the current tick.
    ///
    /// # Arguments
    /// * `snapshot` - Live snapshot.
    /// * `now` - Current instant.
    /// * `test_speed` - Reads the test speed in mm/min. Called only when the
    /// test starts.
    ///
    /// # Returns
    /// Observation.
    pub fn observe<F>(&mut self, snapshot: &LiveSnapshot, now: Instant, test_speed: F) -> Observation
    where
        F: FnOnce() -> f64,
    {
        let current = snapshot.test.status;
        let previous = self._previous_status;
        self._previous_status = current;

        let mut observation = Observation {
            transition: transition(previous, current, self._run.is_some()),
            calculated_deflection: None,
            finished: None,
        };

        match observation.transition {
            Transition::Start => {
                let speed = test_speed();
                info!("Test starts (status {previous} -> {current}) with the speed {speed} mm/min.");

                let mut run = TestRun::new(speed, now);
                if is_active(current) {
                    observation.calculated_deflection = Some(run.record(snapshot, now));
                }

                self._run = Some(run);
            }
            Transition::Sample => {
                if let Some(run) = self._run.as_mut() {
                    observation.calculated_deflection = Some(run.record(snapshot, now));
                }
            }
            Transition::Complete => {
                if let Some(run) = self._run.take() {
                    info!(
                        "Test completes (status {previous} -> {current}) with {} data points.",
                        run.data_points().len()
                    );
                    observation.finished = Some(run.finish(snapshot));
                }
            }
            Transition::Idle => {}
        }

        observation
    }
}

impl Default for TestLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use std::time::Duration;

    fn create_snapshot(status: i16) -> LiveSnapshot {
        let mut snapshot = LiveSnapshot::disconnected("127.0.0.1");
        snapshot.connected = true;
        snapshot.test.status = status;

        snapshot
    }

    fn observe_sequence(lifecycle: &mut TestLifecycle, statuses: &[i16]) -> Vec<Observation> {
        let started = Instant::now();
        statuses
            .iter()
            .enumerate()
            .map(|(idx, status)| {
                lifecycle.observe(
                    &create_snapshot(*status),
                    started + Duration::from_millis(100 * idx as u64),
                    || 12.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_transition() {
        assert_eq!(transition(0, 2, false), Transition::Start);
        assert_eq!(transition(1, 3, false), Transition::Start);
        assert_eq!(transition(-1, 4, true), Transition::Sample);
        assert_eq!(transition(1, 3, true), Transition::Sample);
        assert_eq!(transition(2, 3, true), Transition::Sample);
        assert_eq!(transition(4, 5, true), Transition::Sample);
        assert_eq!(transition(5, 0, true), Transition::Complete);
        assert_eq!(transition(3, 6, true), Transition::Complete);
        assert_eq!(transition(2, 0, true), Transition::Complete);

        assert_eq!(transition(5, 0, false), Transition::Idle);
        assert_eq!(transition(2, 3, false), Transition::Idle);
        assert_eq!(transition(0, 0, false), Transition::Idle);
        assert_eq!(transition(3, 1, true), Transition::Idle);
        assert_eq!(transition(-1, 6, true), Transition::Idle);
        assert_eq!(transition(3, -1, true), Transition::Idle);
        assert_eq!(transition(6, 0, true), Transition::Idle);
    }

    #[test]
    fn test_observe_complete_sequence() {
        let mut lifecycle = TestLifecycle::new();

        let observations = observe_sequence(&mut lifecycle, &[0, 0, 2, 2, 3, 4, 5, 0]);

        let transitions: Vec<Transition> = observations.iter().map(|obs| obs.transition).collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Idle,
                Transition::Idle,
                Transition::Start,
                Transition::Sample,
                Transition::Sample,
                Transition::Sample,
                Transition::Sample,
                Transition::Complete,
            ]
        );

        let finished: Vec<&FinishedRun> = observations
            .iter()
            .filter_map(|obs| obs.finished.as_ref())
            .collect();

        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].data_points.len(), 5);
        assert_eq!(finished[0].final_status(), 0);

        assert!(lifecycle.run().is_none());
        assert_eq!(observations[7].calculated_deflection, None);
    }

    #[test]
    fn test_observe_calculated_deflection() {
        let mut lifecycle = TestLifecycle::new();
        let started = Instant::now();

        lifecycle.observe(&create_snapshot(0), started, || 12.0);
        let observation = lifecycle.observe(&create_snapshot(2), started, || 12.0);

        assert_eq!(observation.calculated_deflection, Some(0.0));

        let observation =
            lifecycle.observe(&create_snapshot(3), started + Duration::from_secs(30), || {
                panic!("Test speed is read only at the start.")
            });

        assert_relative_eq!(observation.calculated_deflection.unwrap(), 6.0);
    }

    #[test]
    fn test_observe_jump_to_idle() {
        let mut lifecycle = TestLifecycle::new();

        let observations = observe_sequence(&mut lifecycle, &[0, 2, 0]);

        assert_eq!(observations[2].transition, Transition::Complete);
        assert_eq!(observations[2].finished.as_ref().unwrap().data_points.len(), 1);
    }

    #[test]
    fn test_observe_oscillation() {
        let mut lifecycle = TestLifecycle::new();

        let observations = observe_sequence(&mut lifecycle, &[0, 2, 0, 2]);

        assert!(observations[2].finished.is_some());
        assert_eq!(observations[3].transition, Transition::Start);
        assert_eq!(lifecycle.run().unwrap().data_points().len(), 1);
    }

    #[test]
    fn test_observe_disconnected() {
        let mut lifecycle = TestLifecycle::new();

        // The unknown status does not end the run.
        let observations = observe_sequence(&mut lifecycle, &[0, 2, 3, -1]);

        assert_eq!(observations[3].transition, Transition::Idle);
        assert!(lifecycle.run().is_some());
        assert_eq!(lifecycle.previous_status(), -1);
    }

    #[test]
    fn test_observe_glitch_keeps_run() {
        let mut lifecycle = TestLifecycle::new();

        let observations = observe_sequence(&mut lifecycle, &[0, 2, 3, 4, -1, 4, 5, 0]);

        let transitions: Vec<Transition> = observations.iter().map(|obs| obs.transition).collect();
        assert_eq!(
            transitions,
            vec![
                Transition::Idle,
                Transition::Start,
                Transition::Sample,
                Transition::Sample,
                Transition::Idle,
                Transition::Sample,
                Transition::Sample,
                Transition::Complete,
            ]
        );

        // Samples before the unknown status are kept.
        let finished = observations[7].finished.as_ref().unwrap();
        assert_eq!(finished.data_points.len(), 5);
        assert!(lifecycle.run().is_none());
    }
}
