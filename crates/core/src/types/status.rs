//! Status enums for tenant records.

use serde::{Deserialize, Serialize};

/// Subscription state of a school.
///
/// Written by the payment webhooks on the backend; the portal only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial period.
    #[default]
    Trial,
    /// Paid and current.
    Active,
    /// Suspended by a platform admin or after a failed payment.
    Suspended,
    /// Subscription period ended without renewal.
    Expired,
    /// Deactivated school.
    Inactive,
    /// A status this build does not know about.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Whether this status locks the school's users out of their dashboards.
    ///
    /// Unknown statuses do not block: the backend may add states before the
    /// portal learns about them.
    #[must_use]
    pub const fn blocks_access(self) -> bool {
        matches!(self, Self::Suspended | Self::Expired | Self::Inactive)
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}
