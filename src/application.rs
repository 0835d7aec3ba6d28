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
use signal_hook::{
    consts::{SIGINT, SIGTERM},
    flag::register,
};
use std::path::Path;
use std::sync::atomic::Ordering;
use std::thread::sleep;
use std::time::Duration;

use crate::config::Config;
use crate::constants::ALL_HOST;
use crate::error::ApplicationError;
use crate::model::Model;

/// Run the application.
///
/// # Arguments
/// * `port_client` - Port for the operator client. If the value is 0, the
/// port is read from the configuration file.
/// * `plc_ip` - IP address of the PLC to override the configuration file.
/// * `is_simulation_mode` - Is the simulation mode or not.
pub fn run(
    port_client: i32,
    plc_ip: Option<String>,
    is_simulation_mode: bool,
) -> Result<(), ApplicationError> {
    // Log the running mode
    let mode = if is_simulation_mode {
        "simulation mode"
    } else {
        "hardware mode"
    };
    info!("Run the ring stiffness controller in {mode}.");

    let config = get_final_config(
        Path::new("config/parameters_app.yaml"),
        port_client,
        plc_ip,
    )?;

    // Create the model
    let mut model = Model::new(config, ALL_HOST, is_simulation_mode)?;

    // Register the signals that stop the application
    for signal in [SIGTERM, SIGINT].iter() {
        let _ = register(*signal, model.stop.clone());
    }

    // Run the processes
    let port = model.run_processes()?;
    info!("Ring stiffness controller is running on port {port}.");

    // Run the main loop
    while !model.stop.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(100));
    }

    info!("Stopping the ring stiffness controller...");

    model.stop();

    info!("Ring stiffness controller is stopped.");

    Ok(())
}

/// Get the final configuration with the command line overrides.
///
/// # Arguments
/// * `config_file` - Configuration file.
/// * `port_client` - Port for the operator client. If the value is 0, the
/// port is read from the configuration file.
/// * `plc_ip` - IP address of the PLC. If None, it is read from the
/// configuration file.
///
/// # Returns
/// Final configuration.
fn get_final_config(
    config_file: &Path,
    port_client: i32,
    plc_ip: Option<String>,
) -> Result<Config, ApplicationError> {
    let mut config = Config::new(config_file)?;

    if port_client != 0 {
        config.port_client = port_client;
    }

    if let Some(ip) = plc_ip {
        config.plc_ip = ip;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_final_config() {
        let config_file = Path::new("config/parameters_app.yaml");

        let config = get_final_config(config_file, 0, None).unwrap();

        assert_eq!(config.port_client, 50010);
        assert_eq!(config.plc_ip, "192.168.0.1");

        let config =
            get_final_config(config_file, 10, Some(String::from("10.0.0.5"))).unwrap();

        assert_eq!(config.port_client, 10);
        assert_eq!(config.plc_ip, "10.0.0.5");
    }

    #[test]
    fn test_get_final_config_error() {
        let result = get_final_config(Path::new("config/wrong.yaml"), 0, None);

        assert!(matches!(result, Err(ApplicationError::Config(_))));
    }
}
