//! Typed views over the Tomcat `server.xml` hierarchy.

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::server_config::tree::{Document, NodeId, Placement};
use crate::server_config::{ServerConfigError, ServerConfigResult};

/// Service whose connectors this module manages.
pub const CATALINA_SERVICE: &str = "Catalina";

/// `hostName` of an SSLHostConfig that does not declare one.
pub const DEFAULT_SSL_HOST: &str = "_default_";

/// `type` of a Certificate that does not declare one.
pub const DEFAULT_CERT_TYPE: &str = "UNDEFINED";

const AJP_PREFIX: &str = "AJP/";

/// Flat description of a connector, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorSummary {
    pub name: String,
    pub port: Option<String>,
    pub protocol: Option<String>,
    pub secure: bool,
}

/// An editable `server.xml`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    path: Option<PathBuf>,
    document: Document,
}

impl ServerConfig {
    /// Parse a configuration from bytes. The result has no backing file.
    pub fn parse(bytes: &[u8]) -> ServerConfigResult<Self> {
        Ok(Self {
            path: None,
            document: Document::parse(bytes)?,
        })
    }

    /// Load a configuration file; `save()` writes back to the same path.
    pub fn load(path: impl AsRef<Path>) -> ServerConfigResult<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading server config");
        let bytes = fs::read(path)?;
        let mut config = Self::parse(&bytes)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Write the in-memory tree back to the file it was loaded from.
    pub fn save(&self) -> ServerConfigResult<()> {
        let path = self.path.as_ref().ok_or_else(|| {
            ServerConfigError::InvalidState("configuration has no backing file".to_string())
        })?;
        tracing::info!(path = %path.display(), "Storing server config");
        fs::write(path, self.to_bytes())?;
        Ok(())
    }

    /// Serialize the tree to any writer.
    pub fn write_to<W: Write>(&self, mut writer: W) -> ServerConfigResult<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.document.to_bytes()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read-only access to the underlying tree.
    pub fn document(&self) -> &Document {
        &self.document
    }

    // --- Attributes ---

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.document.attribute(node, name)
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.document.set_attribute(node, name, value);
    }

    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> Option<String> {
        self.document.remove_attribute(node, name)
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        self.document.tag_name(node)
    }

    // --- Ports ---

    /// Shutdown port declared on the `Server` element.
    pub fn get_port(&self) -> Option<&str> {
        self.document.attribute(self.document.root(), "port")
    }

    /// Port of the first connector that is neither TLS-enabled nor AJP.
    pub fn get_unsecure_port(&self) -> Option<&str> {
        self.raw_connectors()
            .into_iter()
            .find(|c| !self.is_secure(*c) && !self.is_ajp(*c))
            .and_then(|c| self.document.attribute(c, "port"))
    }

    /// Port of the first connector with `SSLEnabled="true"`.
    pub fn get_secure_port(&self) -> Option<&str> {
        self.raw_connectors()
            .into_iter()
            .find(|c| self.is_secure(*c))
            .and_then(|c| self.document.attribute(c, "port"))
    }

    /// Port of the first connector speaking an `AJP/` protocol.
    pub fn get_ajp_port(&self) -> Option<&str> {
        self.raw_connectors()
            .into_iter()
            .find(|c| self.is_ajp(*c))
            .and_then(|c| self.document.attribute(c, "port"))
    }

    fn is_secure(&self, connector: NodeId) -> bool {
        self.document
            .attribute(connector, "SSLEnabled")
            .map_or(false, |v| v.eq_ignore_ascii_case("true"))
    }

    fn is_ajp(&self, connector: NodeId) -> bool {
        self.document
            .attribute(connector, "protocol")
            .map_or(false, |p| p.starts_with(AJP_PREFIX))
    }

    // --- Connectors ---

    fn catalina_service(&self) -> Option<NodeId> {
        let root = self.document.root();
        self.document
            .child_elements(root, "Service")
            .into_iter()
            .find(|s| self.document.attribute(*s, "name") == Some(CATALINA_SERVICE))
    }

    fn raw_connectors(&self) -> Vec<NodeId> {
        match self.catalina_service() {
            Some(service) => self.document.child_elements(service, "Connector"),
            None => Vec::new(),
        }
    }

    /// Connectors of the Catalina service in document order.
    ///
    /// Connectors without a `name` get `Connector<N>`, N being the smallest
    /// positive integer not already taken by a sibling. The assigned names
    /// live in memory until `save()`.
    pub fn get_connectors(&mut self) -> Vec<NodeId> {
        let connectors = self.raw_connectors();

        let mut names: HashSet<String> = connectors
            .iter()
            .filter_map(|c| self.document.attribute(*c, "name"))
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        let mut counter = 0;
        for connector in &connectors {
            let named = self
                .document
                .attribute(*connector, "name")
                .map_or(false, |n| !n.is_empty());
            if named {
                continue;
            }

            let name = loop {
                counter += 1;
                let candidate = format!("Connector{}", counter);
                if !names.contains(&candidate) {
                    break candidate;
                }
            };

            tracing::debug!(name = %name, "Assigning name to unnamed connector");
            self.document.set_attribute(*connector, "name", &name);
            names.insert(name);
        }

        connectors
    }

    /// Connector by name, `None` when absent.
    pub fn get_connector(&mut self, name: &str) -> Option<NodeId> {
        self.get_connectors()
            .into_iter()
            .find(|c| self.document.attribute(*c, "name") == Some(name))
    }

    /// Add a connector after the last existing one. Does not deduplicate.
    pub fn create_connector(&mut self, name: &str) -> ServerConfigResult<NodeId> {
        let service = self.catalina_service().ok_or_else(|| {
            ServerConfigError::InvalidState(format!("Service not found: {}", CATALINA_SERVICE))
        })?;

        let connector = self.document.create_element("Connector");
        self.document.set_attribute(connector, "name", name);
        self.document
            .insert_after_last(service, "Connector", connector, Placement::First);
        Ok(connector)
    }

    pub fn remove_connector(&mut self, name: &str) -> ServerConfigResult<()> {
        let connector = self.get_connector(name).ok_or_else(|| ServerConfigError::NotFound {
            kind: "Connector",
            key: name.to_string(),
        })?;
        self.document.detach(connector);
        Ok(())
    }

    /// Name, port, protocol and TLS flag of every connector.
    pub fn connector_summaries(&mut self) -> Vec<ConnectorSummary> {
        self.get_connectors()
            .into_iter()
            .map(|c| ConnectorSummary {
                name: self.document.attribute(c, "name").unwrap_or_default().to_string(),
                port: self.document.attribute(c, "port").map(str::to_string),
                protocol: self.document.attribute(c, "protocol").map(str::to_string),
                secure: self.is_secure(c),
            })
            .collect()
    }

    // --- SSL hosts ---

    pub fn get_sslhosts(&self, connector: NodeId) -> Vec<NodeId> {
        self.document.child_elements(connector, "SSLHostConfig")
    }

    pub fn get_sslhost(&self, connector: NodeId, hostname: &str) -> ServerConfigResult<NodeId> {
        self.get_sslhosts(connector)
            .into_iter()
            .find(|h| {
                self.document.attribute(*h, "hostName").unwrap_or(DEFAULT_SSL_HOST) == hostname
            })
            .ok_or_else(|| ServerConfigError::NotFound {
                kind: "SSL host",
                key: hostname.to_string(),
            })
    }

    /// Add an SSLHostConfig; `_default_` is expressed by omitting `hostName`.
    pub fn create_sslhost(&mut self, connector: NodeId, hostname: &str) -> NodeId {
        let sslhost = self.document.create_element("SSLHostConfig");
        if hostname != DEFAULT_SSL_HOST {
            self.document.set_attribute(sslhost, "hostName", hostname);
        }
        self.document
            .insert_after_last(connector, "SSLHostConfig", sslhost, Placement::Last);
        sslhost
    }

    pub fn remove_sslhost(&mut self, connector: NodeId, hostname: &str) -> ServerConfigResult<()> {
        let sslhost = self.get_sslhost(connector, hostname)?;
        self.document.detach(sslhost);
        Ok(())
    }

    // --- Certificates ---

    pub fn get_sslcerts(&self, sslhost: NodeId) -> Vec<NodeId> {
        self.document.child_elements(sslhost, "Certificate")
    }

    pub fn get_sslcert(&self, sslhost: NodeId, cert_type: &str) -> ServerConfigResult<NodeId> {
        self.get_sslcerts(sslhost)
            .into_iter()
            .find(|c| self.document.attribute(*c, "type").unwrap_or(DEFAULT_CERT_TYPE) == cert_type)
            .ok_or_else(|| ServerConfigError::NotFound {
                kind: "SSL certificate",
                key: cert_type.to_string(),
            })
    }

    /// Add a Certificate; `UNDEFINED` is expressed by omitting `type`.
    pub fn create_sslcert(&mut self, sslhost: NodeId, cert_type: &str) -> NodeId {
        let sslcert = self.document.create_element("Certificate");
        if cert_type != DEFAULT_CERT_TYPE {
            self.document.set_attribute(sslcert, "type", cert_type);
        }
        self.document
            .insert_after_last(sslhost, "Certificate", sslcert, Placement::Last);
        sslcert
    }

    pub fn remove_sslcert(&mut self, sslhost: NodeId, cert_type: &str) -> ServerConfigResult<()> {
        let sslcert = self.get_sslcert(sslhost, cert_type)?;
        self.document.detach(sslcert);
        Ok(())
    }

    // --- Listeners ---

    pub fn get_listeners(&self) -> Vec<NodeId> {
        self.document.child_elements(self.document.root(), "Listener")
    }

    pub fn get_listener(&self, class_name: &str) -> ServerConfigResult<NodeId> {
        self.get_listeners()
            .into_iter()
            .find(|l| self.document.attribute(*l, "className") == Some(class_name))
            .ok_or_else(|| ServerConfigError::NotFound {
                kind: "Listener",
                key: class_name.to_string(),
            })
    }

    /// Add a listener after the last existing one. Does not deduplicate.
    pub fn create_listener(&mut self, class_name: &str) -> NodeId {
        let root = self.document.root();
        let listener = self.document.create_element("Listener");
        self.document.set_attribute(listener, "className", class_name);
        self.document
            .insert_after_last(root, "Listener", listener, Placement::First);
        listener
    }

    pub fn remove_listener(&mut self, class_name: &str) -> ServerConfigResult<()> {
        let listener = self.get_listener(class_name)?;
        self.document.detach(listener);
        Ok(())
    }
}
