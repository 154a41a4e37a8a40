//! Streaming client state machine and events

use std::time::Duration;

use crate::source::HardwareReadError;

/// Streaming client connection state
///
/// ```text
/// Disconnected ─► Connecting ─► Streaming ─► Reconnecting ─► Connecting ...
///        any state ─► Stopped (shutdown or fatal error)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not yet connected
    Disconnected,
    /// Opening the stream
    Connecting,
    /// Stream open, frames flowing
    Streaming,
    /// Stream lost, waiting out the backoff delay
    Reconnecting,
    /// Terminal
    Stopped,
}

impl ClientState {
    pub fn is_terminal(self) -> bool {
        self == ClientState::Stopped
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(self, next: ClientState) -> bool {
        use ClientState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Streaming) | (Connecting, Reconnecting) => true,
            (Streaming, Reconnecting) => true,
            (Reconnecting, Connecting) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Streaming => "streaming",
            ClientState::Reconnecting => "reconnecting",
            ClientState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a tick produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No open stream
    NotConnected,
    /// Sample source fault
    HardwareFault,
}

/// Events from the streaming client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection state changed
    StateChanged(ClientState),

    /// A frame was written to the stream
    FrameSent { sequence: u64 },

    /// A tick was dropped without sending
    TickSkipped(SkipReason),

    /// The sample source failed for this tick
    HardwareFault {
        error: HardwareReadError,
        consecutive: u32,
    },

    /// Next reconnect attempt is scheduled after `delay`
    ReconnectScheduled { delay: Duration, attempt: u32 },
}

/// Summary returned when the client stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientReport {
    /// Frames written to the stream
    pub frames_sent: u64,
    /// Ticks dropped without sending
    pub ticks_skipped: u64,
    /// Hardware faults seen
    pub hardware_faults: u64,
    /// Successful connections (first connect included)
    pub connections: u64,
    /// Last sequence number assigned, 0 if none
    pub last_sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use ClientState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Streaming));
        assert!(Streaming.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Reconnecting));
        assert!(Streaming.can_transition_to(Stopped));

        assert!(!Disconnected.can_transition_to(Streaming));
        assert!(!Streaming.can_transition_to(Connecting));
        assert!(!Stopped.can_transition_to(Connecting));
        assert!(Stopped.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(ClientState::Reconnecting.to_string(), "reconnecting");
    }
}
