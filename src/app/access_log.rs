//! One line per answered request, in a fixed format for log tooling:
//!
//! ```text
//! 127.0.0.1:52100 "GET /users/7?tab=posts HTTP/1.1" 200 512 "application/json - text/html" "curl/8.4.0"
//! ```
//!
//! The fields are client address, request line, status, uncompressed body
//! length, incoming and outgoing content types, and user agent.

use std::fmt;
use std::net::SocketAddr;

use tracing::{info, warn};

/// Everything the access line needs, captured while the request is dispatched.
#[derive(Debug, Clone)]
pub struct AccessLog {
    pub peer: SocketAddr,
    pub method: String,
    pub uri: String,
    pub protocol: &'static str,
    pub status: u16,
    pub content_length: u64,
    pub request_type: String,
    pub response_type: String,
    pub user_agent: String,
}

impl AccessLog {
    /// Writes the line under the `gaga::access` target: `info` for 200..=398,
    /// `warn` otherwise.
    pub fn emit(&self) {
        if (200..399).contains(&self.status) {
            info!(target: "gaga::access", "{}", self);
        } else {
            warn!(target: "gaga::access", "{}", self);
        }
    }
}

impl fmt::Display for AccessLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{} "{} {} {}" {} {} "{} - {}" "{}""#,
            self.peer,
            self.method,
            self.uri,
            self.protocol,
            self.status,
            self.content_length,
            self.request_type,
            self.response_type,
            self.user_agent,
        )
    }
}
