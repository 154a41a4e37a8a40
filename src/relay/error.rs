//! Relay error types

use super::hub::SubscriberId;

/// Error type for relay operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// No attached subscriber has this id
    UnknownSubscriber(SubscriberId),
    /// Subscriber limit reached
    SubscriberLimit(usize),
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayError::UnknownSubscriber(id) => write!(f, "Unknown subscriber: {}", id),
            RelayError::SubscriberLimit(max) => {
                write!(f, "Subscriber limit of {} reached", max)
            }
        }
    }
}

impl std::error::Error for RelayError {}
