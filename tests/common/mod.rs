//! Common test utilities for cmirror integration tests.
//!
//! Provides `TestEnv` for isolated test environments that don't pollute
//! the user's `~/.local/share/connected-mirror/` directory, and `StubServer`,
//! a tiny HTTP server answering canned bodies.

#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
pub use tempfile::TempDir;

/// A test environment with isolated config and data storage.
///
/// The `cmirror()` method returns a `Command` that sets `CMIRROR_DATA_DIR`
/// and `CMIRROR_CONFIG` per-invocation, making tests parallel-safe.
pub struct TestEnv {
    pub data_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            data_dir: TempDir::new().unwrap(),
            config_dir: TempDir::new().unwrap(),
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.path().join("connections.kdl")
    }

    /// Write connections.kdl.
    pub fn write_config(&self, content: &str) {
        std::fs::write(self.config_path(), content).unwrap();
    }

    /// Declare a single self-hosted connection to `url`.
    pub fn with_connection(self, id: &str, url: &str) -> Self {
        self.write_config(&format!(
            "connection \"{}\" {{\n    url \"{}\"\n}}\nhttp-timeout-secs 5\n",
            id, url
        ));
        self
    }

    /// Get a Command for the cmirror binary with isolated directories.
    pub fn cmirror(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_cmirror"));
        cmd.env("CMIRROR_DATA_DIR", self.data_dir.path());
        cmd.env("CMIRROR_CONFIG", self.config_path());
        cmd.env("CMIRROR_LOG", "warn");
        cmd
    }

    pub fn data_path(&self) -> &Path {
        self.data_dir.path()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP server answering canned bodies by longest matching path prefix.
///
/// Unknown paths get a 404. Every request target is recorded.
pub struct StubServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let routes: BTreeMap<String, (u16, String)> = routes
            .iter()
            .map(|(prefix, status, body)| (prefix.to_string(), (*status, body.to_string())))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                serve(stream, &routes, &recorded);
            }
        });
        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.starts_with(prefix)).count()
    }
}

fn serve(mut stream: TcpStream, routes: &BTreeMap<String, (u16, String)>, requests: &Mutex<Vec<String>>) {
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    loop {
        let mut header = String::new();
        match reader.read_line(&mut header) {
            Ok(0) => break,
            Ok(_) if header == "\r\n" || header == "\n" => break,
            Ok(_) => continue,
            Err(_) => return,
        }
    }
    let target = request_line.split_whitespace().nth(1).unwrap_or("/").to_string();
    requests.lock().unwrap().push(target.clone());

    let (status, body) = routes
        .iter()
        .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, answer)| answer.clone())
        .unwrap_or((404, "{\"errors\":[{\"msg\":\"not found\"}]}".to_string()));
    let reason = if status == 200 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
