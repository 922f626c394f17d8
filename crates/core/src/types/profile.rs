//! Identity and profile records.
//!
//! [`AuthUser`] comes from the identity provider, [`Profile`] and [`School`]
//! come from the `profiles` and `schools` tables of the data backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Email, Role, SchoolId, SubscriptionStatus, UserId};

/// The identity provider's user record.
///
/// Only the stable id and the email are consumed; everything else the
/// provider returns is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Stable unique id, shared with `profiles.id`.
    pub id: UserId,
    /// Sign-in email, when the provider exposes one.
    #[serde(default)]
    pub email: Option<Email>,
}

impl AuthUser {
    /// Create a user record.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: Option<Email>) -> Self {
        Self {
            id: id.into(),
            email,
        }
    }
}

/// A school (tenant) record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct School {
    pub id: SchoolId,
    pub name: String,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub max_students: Option<u32>,
    #[serde(default)]
    pub max_teachers: Option<u32>,
    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,
}

const fn default_true() -> bool {
    true
}

impl School {
    /// An active trial school with no limits.
    #[must_use]
    pub fn new(id: impl Into<SchoolId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            subscription_status: SubscriptionStatus::default(),
            is_active: true,
            max_students: None,
            max_teachers: None,
            subscription_expires_at: None,
        }
    }

    /// Builder-style status setter.
    #[must_use]
    pub const fn with_status(mut self, status: SubscriptionStatus) -> Self {
        self.subscription_status = status;
        self
    }

    /// Whether the school's users must see the "access suspended" page.
    #[must_use]
    pub const fn is_suspended(&self) -> bool {
        !self.is_active || self.subscription_status.blocks_access()
    }
}

/// The application-level user record.
///
/// For every role except the platform admin, the user's school is looked up
/// separately and merged in as [`Profile::school`] (serialised as `schools`,
/// the name of the joined table). `None` means "no school", never "school
/// with default values".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub school_id: Option<SchoolId>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<Email>,
    #[serde(rename = "schools", default, skip_serializing_if = "Option::is_none")]
    pub school: Option<School>,
    /// Free-form display fields (avatar, phone, class, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Profile {
    /// Create a bare profile with no school and no display fields.
    #[must_use]
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            school_id: None,
            full_name: None,
            email: None,
            school: None,
            extra: Map::new(),
        }
    }

    /// Attach the school record, replacing any previous one.
    #[must_use]
    pub fn with_school(mut self, school: School) -> Self {
        self.school_id = Some(school.id.clone());
        self.school = Some(school);
        self
    }

    /// Whether the tenant this profile belongs to locks it out.
    ///
    /// Always `false` for the platform admin and for profiles without a
    /// merged school.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        !self.role.is_platform_admin() && self.school.as_ref().is_some_and(School::is_suspended)
    }

    /// Name to show in the shell: full name, else email, else id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .or_else(|| self.email.as_ref().map(Email::as_str))
            .unwrap_or_else(|| self.id.as_str())
    }
}
