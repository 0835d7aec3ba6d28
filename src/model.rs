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

use log::{info, warn};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{spawn, JoinHandle};

use crate::command::command_client::create_command_schema;
use crate::command::command_schema::CommandContext;
use crate::command::command_service::CommandService;
use crate::config::Config;
use crate::constants::{BOUND_EVENT_QUEUE, TERMINATOR};
use crate::error::{ApplicationError, PersistenceError};
use crate::interface::client_server::ClientServer;
use crate::interface::tcp_server::TcpServer;
use crate::mock::mock_plc::MockPlc;
use crate::persistence::{FileRecorder, PendingMetadata, TestRecorder};
use crate::plc::plc_link::PlcLink;
use crate::plc::s7_client::S7Client;
use crate::plc::transport::PlcTransport;
use crate::publisher::Publisher;
use crate::scheduler::session_scheduler::SessionScheduler;
use crate::telemetry::telemetry_service::TelemetryService;

pub struct Model {
    // Configuration.
    _config: Config,
    // Host of the TCP/IP server.
    _host: String,
    // Services shared by the threads.
    _context: CommandContext,
    // Storage of the finished tests. It is moved to the scheduler thread.
    _recorder: Option<Box<dyn TestRecorder>>,
    // Handles of the threads.
    _handles: Vec<JoinHandle<()>>,
    // Stop all the threads.
    pub stop: Arc<AtomicBool>,
}

impl Model {
    /// Create a new model.
    ///
    /// # Arguments
    /// * `config` - Configuration.
    /// * `host` - Host of the TCP/IP server.
    /// * `is_simulation_mode` - Is the simulation mode or not.
    ///
    /// # Returns
    /// New model.
    pub fn new(config: Config, host: &str, is_simulation_mode: bool) -> Result<Self, PersistenceError> {
        let transport: Box<dyn PlcTransport> = if is_simulation_mode {
            Box::new(MockPlc::new_simulation())
        } else {
            Box::new(S7Client::new(
                &config.plc_ip,
                config.plc_port,
                config.plc_rack,
                config.plc_slot,
                config.plc_timeouts(),
            ))
        };

        let recorder = FileRecorder::new(Path::new(&config.data_dir))?;

        let link = Arc::new(PlcLink::new(transport, &config.plc_ip));
        let context = CommandContext {
            command: Arc::new(CommandService::new(link.clone())),
            telemetry: Arc::new(TelemetryService::new(link)),
            metadata: Arc::new(Mutex::new(PendingMetadata::default())),
            publisher: Arc::new(Publisher::new(BOUND_EVENT_QUEUE)),
        };

        Ok(Self {
            _config: config,
            _host: String::from(host),

            _context: context,
            _recorder: Some(Box::new(recorder)),

            _handles: Vec::new(),

            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Link to the PLC.
    pub fn link(&self) -> &Arc<PlcLink> {
        self._context.command.link()
    }

    /// Run the processes in the threads.
    ///
    /// # Returns
    /// Port of the TCP/IP server for the operator client.
    pub fn run_processes(&mut self) -> Result<i32, ApplicationError> {
        let port = self.run_client_server()?;
        info!("Operator client port: {port}.");

        // The scheduler retries later if the PLC is not reachable now.
        if let Err(error) = self.link().connect() {
            warn!("PLC at {} is not reachable: {error}.", self._config.plc_ip);
        }

        self.run_session_scheduler();

        Ok(port)
    }

    /// Run the TCP/IP server for the operator client.
    ///
    /// # Returns
    /// Port of the server.
    fn run_client_server(&mut self) -> Result<i32, ApplicationError> {
        let mut tcp_server = TcpServer::new(
            "Operator client server",
            &self._host,
            self._config.port_client,
            self._config.timeout_tcp,
            TERMINATOR,
            &self.stop,
        )?;
        let port = tcp_server.get_port();

        let mut client_server = ClientServer::new(create_command_schema(), self._context.clone());
        let handle = spawn(move || {
            tcp_server.run(
                ClientServer::process_command,
                Some(ClientServer::process_first_connection),
                Some(ClientServer::process_disconnection),
                &mut client_server,
            );
        });

        self._handles.push(handle);

        Ok(port)
    }

    /// Run the session scheduler.
    fn run_session_scheduler(&mut self) {
        let recorder = match self._recorder.take() {
            Some(recorder) => recorder,
            None => {
                warn!("Session scheduler is already running.");
                return;
            }
        };

        let mut scheduler = SessionScheduler::new(
            &self._context.telemetry,
            &self._context.command,
            &self._context.publisher,
            recorder,
            &self._context.metadata,
            &self._config,
        );

        let stop = self.stop.clone();
        let handle = spawn(move || {
            scheduler.run(&stop);
        });

        self._handles.push(handle);
    }

    /// Stop the threads and release the PLC.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        for handle in self._handles.drain(..) {
            if handle.join().is_err() {
                warn!("Thread panics before it stops.");
            }
        }

        // Leave no jog behind.
        self._context.command.stop_all_jog();
        self.link().disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::Value;
    use std::net::TcpStream;
    use tempfile::{tempdir, TempDir};

    use crate::constants::LOCAL_HOST;
    use crate::utility::{client_read_json, client_read_specific_json, client_write_and_sleep};

    fn create_model(is_simulation_mode: bool) -> (Model, TempDir) {
        let dir = tempdir().unwrap();

        let mut config = Config::new(Path::new("config/parameters_app.yaml")).unwrap();
        config.port_client = 0;
        config.loop_time = 10;
        config.reconnect_ticks = 5;
        config.plc_ip = String::from(LOCAL_HOST);
        config.data_dir = dir.path().join("data").to_string_lossy().to_string();

        (Model::new(config, LOCAL_HOST, is_simulation_mode).unwrap(), dir)
    }

    fn create_tcp_client(port: i32) -> TcpStream {
        TcpStream::connect(format!("{}:{}", LOCAL_HOST, port)).expect("Tcp stream should connect.")
    }

    #[test]
    fn test_new() {
        let (model, dir) = create_model(true);

        assert!(!model.link().is_connected());
        assert!(model._recorder.is_some());
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn test_new_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();

        let mut config = Config::new(Path::new("config/parameters_app.yaml")).unwrap();
        config.data_dir = file.join("data").to_string_lossy().to_string();

        assert!(Model::new(config, LOCAL_HOST, true).is_err());
    }

    #[test]
    fn test_stop() {
        let (mut model, _dir) = create_model(true);

        model.run_processes().unwrap();

        assert!(model.link().is_connected());

        model.stop();

        assert!(model.stop.load(Ordering::Relaxed));
        assert!(model._handles.is_empty());
        assert!(!model.link().is_connected());
    }

    #[test]
    fn test_run_processes_and_test() {
        let (mut model, dir) = create_model(true);

        let port = model.run_processes().unwrap();
        let mut client = create_tcp_client(port);

        let message = client_read_json(&mut client, TERMINATOR);
        assert_eq!(message["id"], "connectionStatus");
        assert_eq!(message["connected"], true);

        let live_data = client_read_specific_json(&mut client, TERMINATOR, "liveData");
        assert_eq!(live_data["connected"], true);
        assert_eq!(live_data["mode"]["remote"], true);

        // Fast test.
        client_write_and_sleep(
            &mut client,
            "{\"id\":\"cmd_setParameters\",\"test_speed\":600.0,\"sequence_id\":1}\r\n",
            0,
        );
        let written = client_read_specific_json(&mut client, TERMINATOR, "parametersWritten");
        assert_eq!(written["written"][0], "test_speed");

        client_write_and_sleep(
            &mut client,
            "{\"id\":\"cmd_setTestMetadata\",\"sample_id\":\"S-1\",\"sequence_id\":2}\r\n",
            0,
        );
        client_write_and_sleep(
            &mut client,
            "{\"id\":\"cmd_start\",\"sequence_id\":3}\r\n",
            0,
        );

        let complete: Value = client_read_specific_json(&mut client, TERMINATOR, "testComplete");

        assert_eq!(complete["test_id"], 1);
        assert!(complete["results"]["ring_stiffness"].as_f64().unwrap() > 0.0);

        model.stop();

        let summary = std::fs::read_to_string(dir.path().join("data").join("test_1.json")).unwrap();
        let summary: Value = serde_json::from_str(&summary).unwrap();

        assert_eq!(summary["test_speed"], 600.0);
        assert_eq!(summary["metadata"]["sample_id"], "S-1");
    }

    #[test]
    fn test_run_processes_twice() {
        let (mut model, _dir) = create_model(true);

        model.run_processes().unwrap();
        model.run_processes().unwrap();

        // One client server more but only one scheduler.
        assert_eq!(model._handles.len(), 3);

        model.stop();
    }
}
