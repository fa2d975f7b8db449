use std::fmt;

use crate::backoff::AttemptCounters;

/// Lifecycle position of an [`super::Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EndpointState {
    /// No handle; nothing in flight.
    #[default]
    Disconnected,
    /// First connect cycle in progress.
    Connecting,
    /// A live handle is held.
    Connected,
    /// The previous handle was dropped and a new one is being established.
    Reconnecting,
    /// The last connect cycle ran out of attempts. A new `connect()` starts over.
    Failed,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EndpointState::Disconnected => "disconnected",
            EndpointState::Connecting => "connecting",
            EndpointState::Connected => "connected",
            EndpointState::Reconnecting => "reconnecting",
            EndpointState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Point-in-time view of an endpoint's state and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointStatus {
    pub state: EndpointState,
    /// Consecutive failed connection attempts since the last success
    pub connect_attempts: u32,
    /// Consecutive fatal query failures since the last success
    pub query_attempts: u32,
}

impl EndpointStatus {
    #[must_use]
    pub fn counters(&self) -> AttemptCounters {
        AttemptCounters {
            connect: self.connect_attempts,
            query: self.query_attempts,
        }
    }
}
