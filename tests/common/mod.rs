//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use pki_server::lifecycle::{DescriptorStore, ProbeOutcome, ReadinessProbe, ServiceError, ServiceManager};

/// Read the request head so closing the socket does not reset it.
async fn read_request_path(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&buf);
    head.split_whitespace().nth(1).unwrap_or("/").to_string()
}

/// Start a mock HTTP server whose status code depends on the request path.
pub async fn start_programmable_server<F>(f: F) -> SocketAddr
where
    F: Fn(&str) -> u16 + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let path = read_request_path(&mut socket).await;
                        let status = f(&path);
                        let status_text = match status {
                            200 => "200 OK",
                            302 => "302 Found",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            status_text
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start a mock HTTP server that always answers with `status`.
pub async fn start_mock_server(status: u16) -> SocketAddr {
    start_programmable_server(move |_| status).await
}

/// Start a server that answers a TLS ClientHello with plain HTTP.
pub async fn start_plaintext_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut hello = [0u8; 4096];
                        let _ = socket.read(&mut hello).await;
                        let _ = socket
                            .write_all(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n")
                            .await;
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Minimal Tomcat `server.xml` with a plain connector and, optionally, a
/// secure one named `Secure`.
pub fn server_xml(http_port: u16, https_port: Option<u16>) -> String {
    let secure = match https_port {
        Some(port) => format!(
            r#"
    <Connector name="Secure" port="{port}" protocol="org.apache.coyote.http11.Http11NioProtocol" SSLEnabled="true" scheme="https" secure="true">
      <SSLHostConfig>
        <Certificate certificateKeyAlias="sslserver/pki.example.com" certificateKeystoreType="pkcs11"/>
      </SSLHostConfig>
    </Connector>"#
        ),
        None => String::new(),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Server port="8005" shutdown="SHUTDOWN">
  <Listener className="org.apache.catalina.startup.VersionLoggerListener"/>
  <Service name="Catalina">
    <Connector name="Unsecure" port="{http_port}" protocol="HTTP/1.1" redirectPort="8443"/>{secure}
    <Connector port="8009" protocol="AJP/1.3" redirectPort="8443"/>
    <Engine name="Catalina" defaultHost="localhost">
      <Host name="localhost" appBase="webapps"/>
    </Engine>
  </Service>
</Server>
"#
    )
}

pub fn write_server_xml(path: &Path, http_port: u16, https_port: Option<u16>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, server_xml(http_port, https_port)).unwrap();
}

/// Service manager that records calls and never fails.
#[derive(Debug, Clone, Default)]
pub struct RecordingService {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingService {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, verb: &str, service_id: &str) {
        self.calls.lock().unwrap().push(format!("{verb} {service_id}"));
    }
}

impl ServiceManager for RecordingService {
    fn start_signal(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send {
        self.record("start", service_id);
        async { Ok(()) }
    }

    fn stop_signal(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send {
        self.record("stop", service_id);
        async { Ok(()) }
    }

    fn is_active(&self, service_id: &str) -> impl Future<Output = Result<bool, ServiceError>> + Send {
        self.record("is-active", service_id);
        async { Ok(true) }
    }

    fn enable(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send {
        self.record("enable", service_id);
        async { Ok(()) }
    }

    fn disable(&self, service_id: &str) -> impl Future<Output = Result<(), ServiceError>> + Send {
        self.record("disable", service_id);
        async { Ok(()) }
    }
}

/// Probe that replays scripted outcomes and records requested URLs.
///
/// Once the script runs out the last outcome repeats.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    script: Arc<Mutex<VecDeque<ProbeOutcome>>>,
    last: Arc<Mutex<ProbeOutcome>>,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProbe {
    pub fn new(outcomes: Vec<ProbeOutcome>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or_else(|| ProbeOutcome::Transport("connection refused".to_string()));
        Self {
            script: Arc::new(Mutex::new(outcomes.into())),
            last: Arc::new(Mutex::new(last)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn always(outcome: ProbeOutcome) -> Self {
        Self::new(vec![outcome])
    }

    pub fn refused() -> Self {
        Self::always(ProbeOutcome::Transport("connection refused".to_string()))
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl ReadinessProbe for ScriptedProbe {
    fn get(&self, url: &Url, _timeout: Option<Duration>) -> impl Future<Output = ProbeOutcome> + Send {
        self.requests.lock().unwrap().push(url.to_string());
        let outcome = match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => self.last.lock().unwrap().clone(),
        };
        async move { outcome }
    }
}

/// In-memory descriptor store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDescriptors {
    pub files: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryDescriptors {
    pub fn get(&self, app_id: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(app_id).cloned()
    }
}

impl DescriptorStore for MemoryDescriptors {
    fn write(&self, app_id: &str, content: &[u8]) -> io::Result<()> {
        self.files.lock().unwrap().insert(app_id.to_string(), content.to_vec());
        Ok(())
    }

    fn remove(&self, app_id: &str) -> io::Result<bool> {
        Ok(self.files.lock().unwrap().remove(app_id).is_some())
    }

    fn exists(&self, app_id: &str) -> bool {
        self.files.lock().unwrap().contains_key(app_id)
    }

    fn list(&self) -> io::Result<Vec<String>> {
        Ok(self.files.lock().unwrap().keys().cloned().collect())
    }

    fn read(&self, app_id: &str) -> io::Result<Vec<u8>> {
        self.get(app_id)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, app_id.to_string()))
    }

    fn location(&self, app_id: &str) -> String {
        format!("memory:{app_id}.xml")
    }
}
