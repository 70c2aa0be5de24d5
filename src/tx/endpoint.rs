//! Coordinator endpoint reservation
//!
//! The coordinator is reachable by other processes for recovery coordination
//! on a well-known port. Startup reserves it; if another coordinator already
//! holds it, that counts as success so restarts under a supervisor stay
//! idempotent.

use std::io;
use std::net::{SocketAddr, TcpListener};

use tracing::info;

use crate::config::EndpointConfig;
use crate::observability::Event;

use super::errors::StartupError;

/// Outcome of reserving the coordinator endpoint
#[derive(Debug)]
pub enum EndpointState {
    /// This process holds the listener
    Bound(TcpListener),
    /// The address was already in use
    AlreadyRunning(String),
    /// Reservation disabled in config
    Disabled,
}

impl EndpointState {
    /// Reserve the endpoint described by `config`.
    pub fn reserve(config: &EndpointConfig) -> Result<Self, StartupError> {
        if !config.enabled {
            info!(event = %Event::EndpointDisabled, "coordinator endpoint disabled");
            return Ok(EndpointState::Disabled);
        }

        let addr = config.socket_addr();
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                let local = listener
                    .local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|_| addr.clone());
                info!(event = %Event::EndpointBound, addr = %local, "coordinator endpoint bound");
                Ok(EndpointState::Bound(listener))
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                info!(
                    event = %Event::EndpointAlreadyRunning,
                    addr = %addr,
                    "coordinator endpoint already running"
                );
                Ok(EndpointState::AlreadyRunning(addr))
            }
            Err(source) => Err(StartupError::EndpointUnavailable { addr, source }),
        }
    }

    /// Address held by this process, if any
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            EndpointState::Bound(listener) => listener.local_addr().ok(),
            _ => None,
        }
    }

    pub fn is_already_running(&self) -> bool {
        matches!(self, EndpointState::AlreadyRunning(_))
    }
}
