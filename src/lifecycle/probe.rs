//! Readiness probing.
//!
//! # Responsibilities
//! - Issue a single GET against the instance's own connector
//! - Classify the result: HTTP reply, transport failure, TLS failure
//!
//! # Design Decisions
//! - Any HTTP status is a reply; interpreting 404 is the caller's job
//! - Certificate verification is off; instances serve certificates
//!   issued by their own CA
//! - Proxies from the environment are ignored, redirects are not followed

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use url::Url;

/// Classified result of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The server produced an HTTP reply with this status.
    Responded(u16),
    /// Connection refused, reset, timed out, or similar.
    Transport(String),
    /// The TLS layer failed; carries the reason verbatim.
    Tls(String),
}

impl ProbeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Responded(_) => "responded",
            Self::Transport(_) => "transport",
            Self::Tls(_) => "tls",
        }
    }
}

/// Network probe used by the lifecycle controller.
pub trait ReadinessProbe {
    fn get(&self, url: &Url, timeout: Option<Duration>) -> impl Future<Output = ProbeOutcome> + Send;
}

/// Probe backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("pki-server/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

impl ReadinessProbe for HttpProbe {
    async fn get(&self, url: &Url, timeout: Option<Duration>) -> ProbeOutcome {
        let mut request = self.client.get(url.clone());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                tracing::debug!(url = %url, status, "Probe got a reply");
                ProbeOutcome::Responded(status)
            }
            Err(e) => classify(&e),
        }
    }
}

/// Sort a request failure into TLS or transport.
pub fn classify(error: &reqwest::Error) -> ProbeOutcome {
    classify_chain(error)
}

fn classify_chain(error: &(dyn StdError + 'static)) -> ProbeOutcome {
    match tls_reason(error) {
        Some(reason) => ProbeOutcome::Tls(reason),
        None => ProbeOutcome::Transport(error_chain(error)),
    }
}

fn tls_reason(error: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(error);

    while let Some(err) = current {
        if let Some(tls) = err.downcast_ref::<rustls::Error>() {
            return Some(tls.to_string());
        }
        // hyper-util and tokio-rustls each wrap the rustls error in an
        // io::Error, and io::Error::source skips the wrapped value.
        current = match err.downcast_ref::<std::io::Error>().and_then(|io| io.get_ref()) {
            Some(inner) => Some(inner as &(dyn StdError + 'static)),
            None => err.source(),
        };
    }

    None
}

fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut current = error.source();

    while let Some(err) = current {
        let text = err.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = err.source();
    }

    message
}
