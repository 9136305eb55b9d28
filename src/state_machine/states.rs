use serde::{Deserialize, Serialize};
use std::fmt;

/// Send status of one delivery ledger entry
///
/// ```text
/// pending ──claim──▶ sending ──▶ sent (terminal)
///                       │
///                       └──────▶ failed ──claim──▶ sending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Entry created, no send attempted yet
    Pending,
    /// A worker holds the claim and is sending
    Sending,
    /// Delivered; absorbing
    Sent,
    /// Last attempt failed; eligible for a fresh claim
    Failed,
}

impl DeliveryStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent)
    }

    /// States from which a worker may claim the entry
    pub fn is_claimable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }

    /// Check if a worker currently owns the entry
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Sending)
    }

    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Sending)
                | (Self::Failed, Self::Sending)
                | (Self::Sending, Self::Sent)
                | (Self::Sending, Self::Failed)
        )
    }

    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sending" => Ok(Self::Sending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid delivery status: {s}")),
        }
    }
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [DeliveryStatus; 4] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Sending,
        DeliveryStatus::Sent,
        DeliveryStatus::Failed,
    ];

    #[test]
    fn test_sent_is_absorbing() {
        assert!(DeliveryStatus::Sent.is_terminal());
        for next in ALL {
            assert!(!DeliveryStatus::Sent.can_transition_to(next));
        }
    }

    #[test]
    fn test_claimable_states() {
        assert!(DeliveryStatus::Pending.is_claimable());
        assert!(DeliveryStatus::Failed.is_claimable());
        assert!(!DeliveryStatus::Sending.is_claimable());
        assert!(!DeliveryStatus::Sent.is_claimable());

        // Every claimable state can move to sending, and only those can.
        for state in ALL {
            assert_eq!(
                state.can_transition_to(DeliveryStatus::Sending),
                state.is_claimable()
            );
        }
    }

    #[test]
    fn test_sending_resolves_to_sent_or_failed() {
        assert!(DeliveryStatus::Sending.can_transition_to(DeliveryStatus::Sent));
        assert!(DeliveryStatus::Sending.can_transition_to(DeliveryStatus::Failed));
        assert!(!DeliveryStatus::Sending.can_transition_to(DeliveryStatus::Pending));
        assert!(!DeliveryStatus::Pending.can_transition_to(DeliveryStatus::Sent));
    }

    #[test]
    fn test_state_string_conversion() {
        for state in ALL {
            assert_eq!(state.to_string().parse::<DeliveryStatus>().unwrap(), state);
        }
        assert!("queued".parse::<DeliveryStatus>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&DeliveryStatus::Sending).unwrap();
        assert_eq!(json, "\"sending\"");
        assert_eq!(DeliveryStatus::default(), DeliveryStatus::Pending);
    }
}
