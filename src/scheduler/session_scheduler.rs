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
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::sleep;
use std::time::{Duration, Instant};

use crate::command::command_service::CommandService;
use crate::config::Config;
use crate::lifecycle::test_lifecycle::TestLifecycle;
use crate::lifecycle::test_run::FinishedRun;
use crate::persistence::{PendingMetadata, TestRecord, TestRecorder};
use crate::publisher::Publisher;
use crate::scheduler::connection_state::ConnectionState;
use crate::telemetry::event::Event;
use crate::telemetry::snapshot::LiveSnapshot;
use crate::telemetry::telemetry_service::TelemetryService;

/// Periodic loop of the session: reconnect the PLC, poll the live data, run
/// the test lifecycle, and publish to the subscribers. It is the only writer
/// of the connection state and the test lifecycle.
pub struct SessionScheduler {
    // Telemetry service.
    _telemetry: Arc<TelemetryService>,
    // Command service.
    _command: Arc<CommandService>,
    // Publisher to the subscribers.
    _publisher: Arc<Publisher>,
    // Storage of the finished tests.
    _recorder: Box<dyn TestRecorder>,
    // Operator metadata of the next test.
    _metadata: Arc<Mutex<PendingMetadata>>,
    _connection: ConnectionState,
    _lifecycle: TestLifecycle,
    // Remote mode and emergency stop of the last connected tick.
    _was_remote: bool,
    _was_estop: bool,
    // Number of the ticks since the start.
    _tick_count: u64,
    // Loop time in milliseconds.
    _loop_time: u64,
    // Number of the ticks between the reconnect attempts and the refresh of
    // the CPU run state.
    _reconnect_ticks: u32,
    // Local offset from UTC in hour.
    _timezone_offset_hours: i8,
}

impl SessionScheduler {
    /// Create a new session scheduler.
    ///
    /// # Arguments
    /// * `telemetry` - Telemetry service.
    /// * `command` - Command service.
    /// * `publisher` - Publisher to the subscribers.
    /// * `recorder` - Storage of the finished tests.
    /// * `metadata` - Operator metadata of the next test.
    /// * `config` - Configuration.
    ///
    /// # Returns
    /// New session scheduler.
    pub fn new(
        telemetry: &Arc<TelemetryService>,
        command: &Arc<CommandService>,
        publisher: &Arc<Publisher>,
        recorder: Box<dyn TestRecorder>,
        metadata: &Arc<Mutex<PendingMetadata>>,
        config: &Config,
    ) -> Self {
        Self {
            _telemetry: telemetry.clone(),
            _command: command.clone(),
            _publisher: publisher.clone(),
            _recorder: recorder,
            _metadata: metadata.clone(),

            _connection: ConnectionState::new(),
            _lifecycle: TestLifecycle::new(),

            _was_remote: false,
            _was_estop: false,

            _tick_count: 0,

            _loop_time: config.loop_time,
            _reconnect_ticks: config.reconnect_ticks.max(1),
            _timezone_offset_hours: config.timezone_offset_hours,
        }
    }

    /// Connection state.
    pub fn connection(&self) -> &ConnectionState {
        &self._connection
    }

    /// Run one tick.
    ///
    /// # Arguments
    /// * `now` - Start of the tick.
    pub fn tick(&mut self, now: Instant) {
        self._tick_count += 1;

        self.update_connection();

        let snapshot = self._telemetry.poll_snapshot();

        // The link can be lost during the poll.
        if !snapshot.connected && !self._telemetry.link().is_connected() {
            self.mark_link_lost();
        }

        self.check_safety_edges(&snapshot);

        let telemetry = &self._telemetry;
        let observation = self._lifecycle.observe(&snapshot, now, || {
            telemetry.get_parameters().test_speed
        });

        let snapshot = snapshot.with_calculated_deflection(observation.calculated_deflection);
        self._publisher
            .publish_latest(Event::get_message_live_data(&snapshot));

        if let Some(finished) = observation.finished {
            let test_id = self.save(&finished);
            self._publisher.publish_event(Event::get_message_test_complete(
                test_id,
                &finished.results,
                &finished.test,
            ));
        }

        self.refresh_plc_state();
    }

    /// Run one tick and catch the panic.
    ///
    /// # Arguments
    /// * `now` - Start of the tick.
    ///
    /// # Returns
    /// True if the tick finishes normally.
    pub fn tick_guarded(&mut self, now: Instant) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.tick(now))) {
            Ok(()) => true,
            Err(_) => {
                error!("Tick {} of the session scheduler panics.", self._tick_count);
                false
            }
        }
    }

    /// Run the loop until the stop flag is set.
    ///
    /// # Arguments
    /// * `stop` - Stop the loop.
    pub fn run(&mut self, stop: &Arc<AtomicBool>) {
        info!("Session scheduler is running.");

        while !stop.load(Ordering::Relaxed) {
            // Time the tick.
            let now = Instant::now();

            self.tick_guarded(now);

            // Sleep with the remaining time.
            let cycle_time = now.elapsed().as_millis() as u64;
            if self._loop_time > cycle_time {
                sleep(Duration::from_millis(self._loop_time - cycle_time));
            }
        }

        info!("Session scheduler is stopped.");
    }

    /// Reconnect the PLC on the cadence and publish the change of the
    /// connectivity once.
    fn update_connection(&mut self) {
        let link = self._telemetry.link().clone();

        if !link.is_connected() {
            self.mark_link_lost();

            if self._connection.count_reconnect(self._reconnect_ticks) {
                info!("Attempt to reconnect the PLC at {}.", link.ip());
                if let Err(error) = link.connect() {
                    info!("Failed to reconnect the PLC: {error}.");
                }
            }
        }

        if link.is_connected() && self._connection.mark_connected() {
            info!("PLC link is restored.");
            self._connection.last_run_state = link.run_state();
            self._publisher
                .publish_event(Event::get_message_connectivity_restored(link.ip()));

            // No jog survives the reconnection.
            self._command.stop_all_jog();

            // Refresh the cached target deflection.
            self._telemetry.get_parameters();
        }
    }

    /// Publish the loss of the link once and release the jog.
    fn mark_link_lost(&mut self) {
        if self._connection.mark_lost() {
            let link = self._telemetry.link();
            warn!("PLC link is lost.");
            self._publisher
                .publish_event(Event::get_message_connectivity_lost(link.ip()));
            self._command.stop_all_jog();
        }
    }

    /// Release the jog when the remote mode is left or the emergency stop is
    /// pressed.
    fn check_safety_edges(&mut self, snapshot: &LiveSnapshot) {
        if !snapshot.connected {
            return;
        }

        let is_remote = snapshot.mode.remote;
        let is_estop = snapshot.safety.e_stop;

        let left_remote = self._was_remote && !is_remote;
        let pressed_estop = !self._was_estop && is_estop;
        if left_remote || pressed_estop {
            warn!("Stop the jog: left the remote mode ({left_remote}), emergency stop ({pressed_estop}).");
            self._command.stop_all_jog();
        }

        self._was_remote = is_remote;
        self._was_estop = is_estop;
    }

    /// Save the finished run. The metadata is only cleared after a
    /// successful save.
    ///
    /// # Arguments
    /// * `finished` - Finished run.
    ///
    /// # Returns
    /// Identifier of the saved record.
    fn save(&mut self, finished: &FinishedRun) -> Option<i64> {
        let parameters = self._telemetry.get_parameters();
        let mut metadata = self
            ._metadata
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let result = TestRecord::new(parameters, finished, &metadata, self._timezone_offset_hours)
            .and_then(|record| self._recorder.save(&record));

        match result {
            Ok(test_id) => {
                *metadata = PendingMetadata::default();
                Some(test_id)
            }
            Err(error) => {
                error!("Failed to save the test result: {error}.");
                None
            }
        }
    }

    /// Refresh the run state of the CPU and the cached target deflection on
    /// the reconnect cadence.
    fn refresh_plc_state(&mut self) {
        let link = self._telemetry.link();
        if !link.is_connected() || self._tick_count % (self._reconnect_ticks as u64) != 0 {
            return;
        }

        match link.refresh_run_state() {
            Ok(state) => {
                if state != self._connection.last_run_state {
                    info!("PLC CPU is in the {} state.", state.as_ref());
                    self._connection.last_run_state = state;
                }
            }
            Err(error) => warn!("Failed to refresh the CPU state: {error}."),
        }

        self._telemetry.get_parameters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;
    use std::path::Path;

    use crate::constants::BOUND_EVENT_QUEUE;
    use crate::enums::{CpuState, JogDirection};
    use crate::error::PersistenceError;
    use crate::mock::mock_plc::MockPlc;
    use crate::plc::codec::RegisterValue;
    use crate::plc::field_map::{command, parameters, results, servo};
    use crate::plc::plc_link::PlcLink;
    use crate::publisher::Subscription;

    struct FakeRecorder {
        records: Arc<Mutex<Vec<TestRecord>>>,
        is_failing: bool,
    }

    impl TestRecorder for FakeRecorder {
        fn save(&mut self, record: &TestRecord) -> Result<i64, PersistenceError> {
            if self.is_failing {
                return Err(PersistenceError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )));
            }

            let mut records = self.records.lock().unwrap();
            records.push(record.clone());

            Ok(records.len() as i64)
        }
    }

    struct PanicRecorder;

    impl TestRecorder for PanicRecorder {
        fn save(&mut self, _record: &TestRecord) -> Result<i64, PersistenceError> {
            panic!("Recorder panics.");
        }
    }

    struct Fixture {
        scheduler: SessionScheduler,
        plc: MockPlc,
        command: Arc<CommandService>,
        subscription: Subscription,
        metadata: Arc<Mutex<PendingMetadata>>,
        records: Arc<Mutex<Vec<TestRecord>>>,
    }

    fn create_config(reconnect_ticks: u32) -> Config {
        let mut config = Config::new(Path::new("config/parameters_app.yaml")).unwrap();
        config.reconnect_ticks = reconnect_ticks;

        config
    }

    fn create_fixture_with_recorder(
        is_connected: bool,
        reconnect_ticks: u32,
        recorder: Option<Box<dyn TestRecorder>>,
    ) -> Fixture {
        let plc = MockPlc::new();
        plc.set_value(&servo::REMOTE_MODE, RegisterValue::Bit(true));

        let link = Arc::new(PlcLink::new(Box::new(plc.clone()), "127.0.0.1"));
        if is_connected {
            link.connect().unwrap();
        }

        let telemetry = Arc::new(TelemetryService::new(link.clone()));
        let command = Arc::new(CommandService::new(link));
        let publisher = Arc::new(Publisher::new(BOUND_EVENT_QUEUE));
        let subscription = publisher.subscribe();
        let metadata = Arc::new(Mutex::new(PendingMetadata::default()));

        let records = Arc::new(Mutex::new(Vec::new()));
        let recorder = recorder.unwrap_or_else(|| {
            Box::new(FakeRecorder {
                records: records.clone(),
                is_failing: false,
            })
        });

        let scheduler = SessionScheduler::new(
            &telemetry,
            &command,
            &publisher,
            recorder,
            &metadata,
            &create_config(reconnect_ticks),
        );

        plc.clear_history();

        Fixture {
            scheduler,
            plc,
            command,
            subscription,
            metadata,
            records,
        }
    }

    fn create_fixture(is_connected: bool, reconnect_ticks: u32) -> Fixture {
        create_fixture_with_recorder(is_connected, reconnect_ticks, None)
    }

    fn event_ids(subscription: &Subscription) -> Vec<String> {
        subscription
            .take_events()
            .iter()
            .map(|event| event["id"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn run_statuses(fixture: &mut Fixture, statuses: &[i16]) -> Vec<Value> {
        let started = Instant::now();
        let mut events = Vec::new();
        for (idx, status) in statuses.iter().enumerate() {
            fixture
                .plc
                .set_value(&results::TEST_STATUS, RegisterValue::Int(*status));
            fixture
                .scheduler
                .tick(started + Duration::from_millis(100 * idx as u64));

            events.extend(fixture.subscription.take_events());
        }

        events
    }

    #[test]
    fn test_reconnect_cadence() {
        let mut fixture = create_fixture(false, 50);
        fixture.plc.set_reachable(false);

        let now = Instant::now();
        for _ in 0..49 {
            fixture.scheduler.tick(now);
        }

        assert_eq!(fixture.plc.counts().connect, 0);

        fixture.scheduler.tick(now);

        assert_eq!(fixture.plc.counts().connect, 1);

        for _ in 0..50 {
            fixture.scheduler.tick(now);
        }

        assert_eq!(fixture.plc.counts().connect, 2);

        // Silent while disconnected.
        assert!(event_ids(&fixture.subscription).is_empty());
    }

    #[test]
    fn test_restored_once() {
        let mut fixture = create_fixture(false, 3);

        let now = Instant::now();
        for _ in 0..10 {
            fixture.scheduler.tick(now);
        }

        assert_eq!(event_ids(&fixture.subscription), vec!["connectivityRestored"]);
        assert_eq!(fixture.plc.counts().connect, 1);
        assert_eq!(fixture.command.stop_count(), 1);
        assert!(fixture.scheduler.connection().connected);
        assert_eq!(fixture.scheduler.connection().last_run_state, CpuState::Run);
    }

    #[test]
    fn test_lost_once() {
        let mut fixture = create_fixture(true, 50);

        let now = Instant::now();
        fixture.scheduler.tick(now);

        assert_eq!(event_ids(&fixture.subscription), vec!["connectivityRestored"]);

        fixture.plc.set_reachable(false);
        for _ in 0..5 {
            fixture.scheduler.tick(now);
        }

        assert_eq!(event_ids(&fixture.subscription), vec!["connectivityLost"]);
        assert_eq!(fixture.command.stop_count(), 2);
        assert!(!fixture.scheduler.connection().connected);

        let live_data = fixture.subscription.take_latest().unwrap();
        assert_eq!(live_data["connected"], false);
        assert_eq!(live_data["test"]["status"], -1);
    }

    #[test]
    fn test_lost_in_poll() {
        let mut fixture = create_fixture(true, 50);

        let now = Instant::now();
        fixture.scheduler.tick(now);
        event_ids(&fixture.subscription);
        let stop_count = fixture.command.stop_count();

        // The link is lost in the middle of the tick.
        fixture.plc.set_reachable(false);
        fixture.scheduler.tick(now);

        assert_eq!(event_ids(&fixture.subscription), vec!["connectivityLost"]);
        assert_eq!(fixture.command.stop_count(), stop_count + 1);
        assert!(!fixture.scheduler.connection().connected);

        fixture.scheduler.tick(now);

        assert!(event_ids(&fixture.subscription).is_empty());
        assert_eq!(fixture.command.stop_count(), stop_count + 1);
    }

    #[test]
    fn test_deflection_target() {
        let mut fixture = create_fixture(false, 5);
        fixture
            .plc
            .set_value(&parameters::DEFLECTION_TARGET, RegisterValue::Real(9.0));

        // Refreshed on the connection.
        let now = Instant::now();
        for _ in 0..5 {
            fixture.scheduler.tick(now);
        }

        let live_data = fixture.subscription.take_latest().unwrap();
        assert_eq!(live_data["deflection"]["target"], 9.0);

        // Refreshed on the cadence.
        fixture
            .plc
            .set_value(&parameters::DEFLECTION_TARGET, RegisterValue::Real(7.5));
        for _ in 0..6 {
            fixture.scheduler.tick(now);
        }

        let live_data = fixture.subscription.take_latest().unwrap();
        assert_eq!(live_data["deflection"]["target"], 7.5);
    }

    #[test]
    fn test_publish_latest() {
        let mut fixture = create_fixture(true, 50);

        let now = Instant::now();
        for value in 0..3 {
            fixture
                .plc
                .set_value(&results::FORCE_KN, RegisterValue::Real(value as f32));
            fixture.scheduler.tick(now);
        }

        let live_data = fixture.subscription.take_latest().unwrap();
        assert_eq!(live_data["id"], "liveData");
        assert_eq!(live_data["force"]["kN"], 2.0);
        assert_eq!(fixture.subscription.take_latest(), None);
    }

    #[test]
    fn test_stop_jog_when_local() {
        let mut fixture = create_fixture(true, 50);

        let now = Instant::now();
        fixture.scheduler.tick(now);
        assert!(fixture.command.jog(JogDirection::Forward, true).success);

        let stop_count = fixture.command.stop_count();

        fixture
            .plc
            .set_value(&servo::REMOTE_MODE, RegisterValue::Bit(false));
        fixture.scheduler.tick(now);
        fixture.scheduler.tick(now);

        assert_eq!(fixture.command.stop_count(), stop_count + 1);
        assert_eq!(
            fixture.plc.get_value(&command::JOG_FORWARD),
            Some(RegisterValue::Bit(false))
        );
    }

    #[test]
    fn test_stop_jog_on_estop() {
        let mut fixture = create_fixture(true, 50);

        let now = Instant::now();
        fixture.scheduler.tick(now);

        let stop_count = fixture.command.stop_count();

        fixture
            .plc
            .set_value(&servo::ESTOP_ACTIVE, RegisterValue::Bit(true));
        fixture.scheduler.tick(now);
        fixture.scheduler.tick(now);

        assert_eq!(fixture.command.stop_count(), stop_count + 1);
    }

    #[test]
    fn test_test_complete() {
        let mut fixture = create_fixture(true, 50);
        fixture.plc.set_value(&results::SN_CLASS, RegisterValue::Int(8));
        *fixture.metadata.lock().unwrap() = PendingMetadata {
            sample_id: String::from("S-42"),
            ..PendingMetadata::default()
        };

        let events = run_statuses(&mut fixture, &[0, 0, 2, 2, 3, 4, 5, 0]);

        let completes: Vec<&Value> = events
            .iter()
            .filter(|event| event["id"] == "testComplete")
            .collect();

        assert_eq!(completes.len(), 1);
        assert_eq!(completes[0]["test_id"], 1);
        assert_eq!(completes[0]["results"]["sn_class"], 8);

        let records = fixture.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].data_points.len(), 5);
        assert_eq!(records[0].test_speed, 12.0);
        assert_eq!(
            records[0].metadata.as_ref().map(|metadata| metadata.sample_id.as_str()),
            Some("S-42")
        );

        assert!(fixture.metadata.lock().unwrap().is_empty());
    }

    #[test]
    fn test_test_complete_save_fail() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let mut fixture = create_fixture_with_recorder(
            true,
            50,
            Some(Box::new(FakeRecorder {
                records,
                is_failing: true,
            })),
        );
        fixture.metadata.lock().unwrap().operator = String::from("operator");

        let events = run_statuses(&mut fixture, &[0, 2, 3, 0]);

        let complete = events
            .iter()
            .find(|event| event["id"] == "testComplete")
            .unwrap();

        assert!(complete["test_id"].is_null());

        // Kept for the next test.
        assert_eq!(fixture.metadata.lock().unwrap().operator, "operator");
    }

    #[test]
    fn test_calculated_deflection() {
        let mut fixture = create_fixture(true, 50);

        run_statuses(&mut fixture, &[0, 2]);

        let live_data = fixture.subscription.take_latest().unwrap();
        assert_eq!(live_data["calculated_deflection"], 0.0);

        run_statuses(&mut fixture, &[0]);

        let live_data = fixture.subscription.take_latest().unwrap();
        assert!(live_data.get("calculated_deflection").is_none());
    }

    #[test]
    fn test_tick_guarded() {
        let mut fixture = create_fixture_with_recorder(true, 50, Some(Box::new(PanicRecorder)));

        let now = Instant::now();
        for status in [0, 2] {
            fixture
                .plc
                .set_value(&results::TEST_STATUS, RegisterValue::Int(status));
            assert!(fixture.scheduler.tick_guarded(now));
        }

        fixture
            .plc
            .set_value(&results::TEST_STATUS, RegisterValue::Int(0));
        assert!(!fixture.scheduler.tick_guarded(now));

        // The loop goes on.
        assert!(fixture.scheduler.tick_guarded(now));
    }

    #[test]
    fn test_run() {
        let mut fixture = create_fixture(true, 50);
        let stop = Arc::new(AtomicBool::new(true));

        // Stopped before the first tick.
        fixture.scheduler.run(&stop);

        assert_eq!(fixture.plc.counts().read, 0);
    }
}
