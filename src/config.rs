//! Daemon configuration
//!
//! Every option is a CLI flag with a `CLASSPULSE_*` environment fallback.

use std::net::SocketAddr;

use clap::Args;

use crate::error::{PulseError, Result};

/// Default store location
pub const DEFAULT_DATABASE: &str = "classpulse.db";

/// Network settings for `classpulse serve`
#[derive(Args, Debug, Clone)]
pub struct DaemonConfig {
    /// Host to bind both listeners to
    #[arg(long, env = "CLASSPULSE_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port for the REST API
    #[arg(long, env = "CLASSPULSE_HTTP_PORT", default_value = "5000")]
    pub http_port: u16,

    /// Port for the real-time WebSocket server
    #[arg(long, env = "CLASSPULSE_WS_PORT", default_value = "5001")]
    pub ws_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 5000,
            ws_port: 5001,
        }
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.http_port != 0 && self.http_port == self.ws_port {
            return Err(PulseError::Config {
                message: format!(
                    "REST and WebSocket listeners cannot share port {}",
                    self.http_port
                ),
            });
        }
        Ok(())
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        self.addr(self.http_port)
    }

    pub fn ws_addr(&self) -> Result<SocketAddr> {
        self.addr(self.ws_port)
    }

    fn addr(&self, port: u16) -> Result<SocketAddr> {
        format!("{}:{}", self.host, port)
            .parse()
            .map_err(|e| PulseError::Config {
                message: format!("invalid bind address {}:{}: {}", self.host, port, e),
            })
    }
}
