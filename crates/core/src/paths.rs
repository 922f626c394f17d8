//! Well-known portal paths and the role-scoped route table.

use crate::Role;

pub const ROOT: &str = "/";
pub const LOGIN: &str = "/login";
pub const SIGNUP: &str = "/signup";
pub const UNAUTHORIZED: &str = "/unauthorized";

pub const SUPER_ADMIN_HOME: &str = "/super-admin";
pub const SCHOOL_ADMIN_HOME: &str = "/school-admin";
pub const TEACHER_HOME: &str = "/teacher";
pub const STUDENT_HOME: &str = "/student";

/// Page trees and the roles allowed into them.
pub const ROLE_SCOPES: [(&str, &[Role]); 4] = [
    (SUPER_ADMIN_HOME, &[Role::SuperAdmin]),
    (SCHOOL_ADMIN_HOME, &[Role::SchoolAdmin]),
    (TEACHER_HOME, &[Role::Teacher]),
    (STUDENT_HOME, &[Role::Student]),
];

/// Roles allowed to open `path`, or `None` for paths outside every role tree.
///
/// Matching is by whole path segment, so `/teacher/exams` belongs to the
/// teacher tree but `/teachers` does not.
#[must_use]
pub fn required_roles(path: &str) -> Option<&'static [Role]> {
    ROLE_SCOPES.iter().find_map(|(prefix, roles)| {
        let rest = path.strip_prefix(prefix)?;
        (rest.is_empty() || rest.starts_with('/')).then_some(*roles)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_roles_by_segment() {
        assert_eq!(required_roles("/teacher"), Some(&[Role::Teacher][..]));
        assert_eq!(
            required_roles("/teacher/exams/42"),
            Some(&[Role::Teacher][..])
        );
        assert_eq!(
            required_roles("/school-admin/staff"),
            Some(&[Role::SchoolAdmin][..])
        );
        assert_eq!(required_roles("/teachers"), None);
        assert_eq!(required_roles("/login"), None);
        assert_eq!(required_roles("/"), None);
    }

    #[test]
    fn test_every_role_home_is_scoped_to_that_role() {
        for role in Role::ALL {
            let roles = required_roles(role.home_path());
            assert_eq!(roles, Some(&[role][..]));
        }
    }
}
