//! KDL schema of `connections.kdl`.
//!
//! ```kdl
//! connection "my-sq" {
//!     url "https://sonar.example.com"
//!     organization "my-org"
//!     token-env "SONAR_TOKEN"
//! }
//! storage-root "/var/lib/cmirror"
//! http-timeout-secs 30
//! ```

use kdl::{KdlDocument, KdlEntry, KdlNode, KdlValue};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::ServerConnection;

/// A server connection declared in the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub id: String,

    /// Base URL of the server
    pub url: String,

    /// Organization key; makes the connection organization-scoped
    pub organization: Option<String>,

    /// Name of the environment variable holding the token
    pub token_env: Option<String>,
}

impl ConnectionConfig {
    pub fn to_server_connection(&self) -> ServerConnection {
        ServerConnection {
            id: self.id.clone(),
            base_url: self.url.clone(),
            organization: self.organization.clone(),
        }
    }

    /// Token read from the configured environment variable, if set and not empty.
    pub fn token(&self) -> Option<String> {
        let name = self.token_env.as_ref()?;
        std::env::var(name).ok().filter(|t| !t.is_empty())
    }

    fn from_kdl(node: &KdlNode) -> Self {
        let mut connection = Self {
            id: first_string(node).unwrap_or_default(),
            ..Default::default()
        };
        if let Some(children) = node.children() {
            if let Some(url) = children.get("url").and_then(first_string) {
                connection.url = url;
            }
            connection.organization = children.get("organization").and_then(first_string);
            connection.token_env = children.get("token-env").and_then(first_string);
        }
        connection
    }

    fn to_kdl(&self) -> KdlNode {
        let mut node = KdlNode::new("connection");
        node.push(KdlEntry::new(KdlValue::String(self.id.clone())));

        let mut children = KdlDocument::new();
        children.nodes_mut().push(string_node("url", &self.url));
        if let Some(ref organization) = self.organization {
            children.nodes_mut().push(string_node("organization", organization));
        }
        if let Some(ref token_env) = self.token_env {
            children.nodes_mut().push(string_node("token-env", token_env));
        }
        node.set_children(children);
        node
    }
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|entry| entry.value().as_string())
        .map(|s| s.to_string())
}

fn string_node(name: &str, value: &str) -> KdlNode {
    let mut node = KdlNode::new(name);
    node.push(KdlEntry::new(KdlValue::String(value.to_string())));
    node
}

/// Content of `connections.kdl`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub connections: Vec<ConnectionConfig>,

    /// Root directory of every connection mirror
    pub storage_root: Option<PathBuf>,

    /// Timeout applied to each HTTP request
    pub http_timeout_secs: Option<u64>,
}

impl MirrorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a connection up by id.
    pub fn connection(&self, id: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.id == id)
    }

    /// Validate the config values.
    ///
    /// Returns an error message for the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        let mut seen = std::collections::BTreeSet::new();
        for connection in &self.connections {
            if connection.id.is_empty() {
                return Err("connection without an id".to_string());
            }
            if !seen.insert(connection.id.as_str()) {
                return Err(format!("connection '{}' is declared twice", connection.id));
            }
            if !(connection.url.starts_with("http://") || connection.url.starts_with("https://")) {
                return Err(format!(
                    "connection '{}' needs an http(s) url, got '{}'",
                    connection.id, connection.url
                ));
            }
        }
        if self.http_timeout_secs == Some(0) {
            return Err("http-timeout-secs must be positive".to_string());
        }
        Ok(())
    }

    /// Parse config from a KDL document.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();

        config.connections = doc
            .nodes()
            .iter()
            .filter(|node| node.name().value() == "connection")
            .map(ConnectionConfig::from_kdl)
            .collect();

        if let Some(root) = doc.get("storage-root").and_then(first_string) {
            config.storage_root = Some(PathBuf::from(root));
        }

        if let Some(node) = doc.get("http-timeout-secs") {
            if let Some(entry) = node.entries().first() {
                if let Some(i) = entry.value().as_integer() {
                    config.http_timeout_secs = u64::try_from(i).ok();
                }
            }
        }

        config
    }

    /// Convert config to a KDL document.
    pub fn to_kdl(&self) -> KdlDocument {
        let mut doc = KdlDocument::new();

        for connection in &self.connections {
            doc.nodes_mut().push(connection.to_kdl());
        }

        if let Some(ref root) = self.storage_root {
            doc.nodes_mut()
                .push(string_node("storage-root", &root.to_string_lossy()));
        }

        if let Some(secs) = self.http_timeout_secs {
            let mut node = KdlNode::new("http-timeout-secs");
            node.push(KdlEntry::new(KdlValue::Integer(secs as i128)));
            doc.nodes_mut().push(node);
        }

        doc
    }
}
