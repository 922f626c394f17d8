//! Application roles.

use serde::{Deserialize, Serialize};

use crate::paths;

/// Error returned when a role string is not one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

/// Role of a portal user, stored on the `profiles` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform operator. Manages every school and is never subject to a
    /// school's subscription state.
    SuperAdmin,
    /// Administrator of a single school (staff, classes, subjects).
    SchoolAdmin,
    /// Teacher: question banks, exam sessions and grading.
    Teacher,
    /// Student: takes exams.
    Student,
}

impl Role {
    /// All roles, in privilege order.
    pub const ALL: [Self; 4] = [
        Self::SuperAdmin,
        Self::SchoolAdmin,
        Self::Teacher,
        Self::Student,
    ];

    /// Whether this is the top-level administrative role.
    ///
    /// Platform admins operate across tenants, so they have no school record
    /// merged onto their profile and bypass the suspension check.
    #[must_use]
    pub const fn is_platform_admin(self) -> bool {
        matches!(self, Self::SuperAdmin)
    }

    /// The dashboard a signed-in user of this role lands on.
    #[must_use]
    pub const fn home_path(self) -> &'static str {
        match self {
            Self::SuperAdmin => paths::SUPER_ADMIN_HOME,
            Self::SchoolAdmin => paths::SCHOOL_ADMIN_HOME,
            Self::Teacher => paths::TEACHER_HOME,
            Self::Student => paths::STUDENT_HOME,
        }
    }

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::SchoolAdmin => "school_admin",
            Self::Teacher => "teacher",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "school_admin" => Ok(Self::SchoolAdmin),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!(
            "principal".parse::<Role>(),
            Err(RoleParseError("principal".to_owned()))
        );
    }

    #[test]
    fn test_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::SchoolAdmin).unwrap(),
            "\"school_admin\""
        );
        let role: Role = serde_json::from_str("\"super_admin\"").unwrap();
        assert_eq!(role, Role::SuperAdmin);
    }

    #[test]
    fn test_only_super_admin_is_platform_admin() {
        assert!(Role::SuperAdmin.is_platform_admin());
        assert!(!Role::SchoolAdmin.is_platform_admin());
        assert!(!Role::Teacher.is_platform_admin());
        assert!(!Role::Student.is_platform_admin());
    }

    #[test]
    fn test_home_paths() {
        assert_eq!(Role::SuperAdmin.home_path(), "/super-admin");
        assert_eq!(Role::SchoolAdmin.home_path(), "/school-admin");
        assert_eq!(Role::Teacher.home_path(), "/teacher");
        assert_eq!(Role::Student.home_path(), "/student");
    }
}
