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
use serde_json::Value;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::sleep;
use std::time::Duration;

/// TCP/IP server for one client at a time. The messages are terminated by
/// the terminator.
pub struct TcpServer {
    _name: String,
    _listener: TcpListener,
    _reader: Option<BufReader<TcpStream>>,
    _writer: Option<BufWriter<TcpStream>>,
    // Timeout in milliseconds.
    pub timeout: u64,
    // Buffer to read the received message.
    _buffer: Vec<u8>,
    // Terminator of the message.
    _terminator: Vec<u8>,
    // Stop the server.
    _stop: Arc<AtomicBool>,
    // The server is connected or not.
    _is_connected: Arc<AtomicBool>,
}

impl TcpServer {
    /// Create a new TcpServer instance.
    ///
    /// # Arguments
    /// * `name` - Name of ther server.
    /// * `host` - Hostname or IP address.
    /// * `port` - Port number. Put 0 to let the OS choose the port number.
    /// * `timeout` - Timeout in milliseconds.
    /// * `terminator` - Terminator of the message.
    /// * `stop` - Stop the server.
    ///
    /// # Returns
    /// A TcpServer instance, or the error if the listener can not bind.
    pub fn new(
        name: &str,
        host: &str,
        port: i32,
        timeout: u64,
        terminator: &[u8],
        stop: &Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(format!("{host}:{port}"))?;
        listener.set_nonblocking(true)?;

        const DEFAULT_BUFFER_SIZE: usize = 256;

        Ok(Self {
            _name: String::from(name),

            _listener: listener,
            _reader: None,
            _writer: None,
            timeout: timeout,

            _buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            _terminator: terminator.to_vec(),

            _stop: stop.clone(),
            _is_connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Get the port number.
    ///
    /// # Returns
    /// Port number. If the port number is not available, return -1.
    pub fn get_port(&self) -> i32 {
        match self._listener.local_addr() {
            Ok(addr) => addr.port() as i32,
            Err(_) => -1,
        }
    }

    /// Accept a connection.
    ///
    /// # Returns
    /// True if the connection is accepted. Otherwise, false.
    fn accept(&mut self) -> bool {
        let stream = match self._listener.accept() {
            Ok((stream, _)) => stream,
            Err(_) => return false,
        };

        if let Err(error) = Self::setup_stream(&stream) {
            warn!("{} fails to set up the stream: {error}.", self._name);
            let _ = stream.shutdown(Shutdown::Both);

            return false;
        }

        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(error) => {
                warn!("{} fails to clone the stream: {error}.", self._name);
                let _ = stream.shutdown(Shutdown::Both);

                return false;
            }
        };

        if let Ok(peer_addr) = stream.peer_addr() {
            info!("{} is connected from {}.", self._name, peer_addr);
        }

        self._reader = Some(BufReader::new(reader));
        self._writer = Some(BufWriter::new(stream));

        self._is_connected.store(true, Ordering::Relaxed);

        true
    }

    fn setup_stream(stream: &TcpStream) -> io::Result<()> {
        stream.set_nodelay(true)?;
        stream.set_nonblocking(true)
    }

    /// Check if the server is connected.
    ///
    /// # Returns
    /// True if a client is connected. Otherwise, false.
    pub fn is_connected(&self) -> bool {
        self._reader.is_some() && self._writer.is_some()
    }

    /// Get the reference to the connection status. This is useful to check the
    /// connection status in a separate thread.
    ///
    /// # Returns
    /// Connection status.
    pub fn get_connection_status_reference(&self) -> Arc<AtomicBool> {
        self._is_connected.clone()
    }

    /// Read the JSON data.
    ///
    /// # Returns
    /// JSON data. Null if there is no complete message.
    pub fn read_json(&mut self) -> Value {
        let data = self.read_string();
        match serde_json::from_str(&data) {
            Ok(value) => value,
            Err(_) => {
                if !data.is_empty() {
                    info!("{} receives non-JSON message: {}.", self._name, data);
                }
                Value::Null
            }
        }
    }

    /// Read the string data.
    ///
    /// # Returns
    /// Message without the terminator. Empty if there is no complete message.
    fn read_string(&mut self) -> String {
        let terminator_length = self._terminator.len();
        // Always clear the buffer before reading the data.
        self._buffer.clear();
        if let Some(stream) = self._reader.as_mut() {
            let mut byte = [0; 1];
            loop {
                match stream.read(&mut byte) {
                    Ok(0) => {
                        debug!(
                            "{} is disconnected from the client when reading.",
                            self._name
                        );
                        self.close_stream();
                        break;
                    }

                    Ok(_) => {
                        self._buffer.push(byte[0]);
                        if self._buffer.ends_with(&self._terminator) {
                            break;
                        }
                    }

                    // Nothing more to read for now.
                    Err(_) => {
                        break;
                    }
                }
            }
        }

        if self._buffer.len() < terminator_length {
            return String::new();
        }

        match std::str::from_utf8(&self._buffer[..(self._buffer.len() - terminator_length)]) {
            Ok(message) => {
                debug!("{} receives: {}.", self._name, message);

                String::from(message)
            }
            Err(_) => String::new(),
        }
    }

    /// Write the JSON item.
    ///
    /// # Arguments
    /// * `item` - JSON data.
    pub fn write_json(&mut self, item: &Value) {
        self.write_string(&item.to_string());
        self.flush();
    }

    /// Write the JSON items. If there is still data in the buffer, the new
    /// data is skipped and the existing data is flushed instead. The items
    /// are written in order until the buffer is full, so a slow client never
    /// receives a partial message.
    ///
    /// # Arguments
    /// * `items` - JSON data.
    ///
    /// # Returns
    /// Number of the leading items written to the buffer.
    pub fn write_jsons(&mut self, items: &[Value]) -> usize {
        let mut number_written = 0;
        if let Some(stream) = self._writer.as_mut() {
            if stream.buffer().is_empty() {
                for item in items {
                    let mut data = item.to_string().into_bytes();
                    data.extend_from_slice(&self._terminator);

                    // An item larger than the whole buffer goes directly.
                    let spare = stream.capacity() - stream.buffer().len();
                    if data.len() > spare && !stream.buffer().is_empty() {
                        break;
                    }

                    if stream.write_all(&data).is_err() {
                        break;
                    }

                    number_written += 1;
                }
            }
        }

        self.flush();

        number_written
    }

    /// Write the string data to buffer.
    ///
    /// # Arguments
    /// * `data` - Data without the terminator.
    fn write_string(&mut self, data: &str) {
        if let Some(stream) = self._writer.as_mut() {
            // Ignore the possible error. It shows up in the flush.
            let _ = stream
                .write_all(data.as_bytes())
                .and_then(|_| stream.write_all(&self._terminator));
        }
    }

    /// Flush the stream.
    fn flush(&mut self) {
        if let Some(stream) = self._writer.as_mut() {
            if let Err(error) = stream.flush() {
                if error.kind() != io::ErrorKind::WouldBlock {
                    debug!(
                        "{} fails to flush the stream: {}. Diconnecting...",
                        self._name, error
                    );
                    self.close_stream();
                }
            }
        }
    }

    /// Close the stream.
    fn close_stream(&mut self) {
        info!("{} is disconnected.", self._name);

        // Flush the stream in the writer first before closing the stream.
        if let Some(stream) = self._writer.as_mut() {
            let _ = stream.flush();
        }

        if let Some(stream) = self._reader.as_ref() {
            let _ = stream.get_ref().shutdown(Shutdown::Both);
        }

        self._reader = None;
        self._writer = None;

        self._is_connected.store(false, Ordering::Relaxed);
    }

    /// Run the server.
    ///
    /// # Arguments
    /// * `callback_periodic` - Called periodically while a client is
    /// connected.
    /// * `callback_first_time` - Called once when a client is connected.
    /// * `callback_disconnect` - Called once when the client is disconnected,
    /// including the stop of the server with a connected client.
    /// * `other` - Other data that is used in the callback functions.
    pub fn run<F1, F2, F3, T>(
        &mut self,
        mut callback_periodic: F1,
        mut callback_first_time: Option<F2>,
        mut callback_disconnect: Option<F3>,
        other: &mut T,
    ) where
        F1: FnMut(&mut TcpServer, &mut T),
        F2: FnMut(&mut TcpServer, &mut T),
        F3: FnMut(&mut TcpServer, &mut T),
    {
        info!("{} is running.", self._name);
        while !self._stop.load(Ordering::Relaxed) {
            if self.is_connected() {
                callback_periodic(self, other);

                if !self.is_connected() {
                    if let Some(ref mut callback) = callback_disconnect {
                        callback(self, other);
                    }
                }
            } else if self.accept() {
                if let Some(ref mut callback) = callback_first_time {
                    callback(self, other);
                }
            } else {
                sleep(Duration::from_millis(self.timeout));
            }
        }

        if self.is_connected() {
            self.close_stream();
            if let Some(ref mut callback) = callback_disconnect {
                callback(self, other);
            }
        }

        info!("{} is stopped.", self._name);
    }
}
