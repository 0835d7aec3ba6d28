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

//! # Ring Stiffness Controller
//!
//! This library reads the telemetry of the pipe ring-stiffness test rig from
//! the Siemens S7 PLC, runs the commands of the operator, and records the
//! finished tests.
pub mod application;
pub mod command;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod event_queue;
pub mod interface;
pub mod lifecycle;
pub mod mock;
pub mod model;
pub mod persistence;
pub mod plc;
pub mod publisher;
pub mod scheduler;
pub mod telemetry;
pub mod utility;
