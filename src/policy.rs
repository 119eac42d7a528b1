//! Capability check applied before participant-scoped operations.
//!
//! Handlers describe what they are about to do and to what; this module alone
//! decides how the caller's role and participation translate into access.

use crate::models::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewChallenge,
    DeleteChallenge,
    WriteProgress,
    ReadProgress,
}

/// The caller's standing towards one challenge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resource {
    pub is_author:     bool,
    /// `Some(accepted)` when the caller has a participation row.
    pub participation: Option<bool>,
}

impl Resource {
    pub fn participant(accepted: bool) -> Self {
        Self { is_author: false, participation: Some(accepted) }
    }

    pub fn outsider() -> Self {
        Self::default()
    }

    fn accepted(&self) -> bool {
        self.participation == Some(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    /// Admin bypass: may look, must not write.
    ReadOnly,
    Deny,
}

impl Access {
    pub fn can_read(self) -> bool {
        matches!(self, Access::Allow | Access::ReadOnly)
    }
}

pub fn check(role: UserRole, operation: Operation, resource: &Resource) -> Access {
    let admin = role == UserRole::Admin;
    let granted = match operation {
        Operation::ViewChallenge   => resource.is_author || resource.accepted(),
        Operation::DeleteChallenge => return if admin { Access::Allow } else { Access::Deny },
        Operation::WriteProgress   => resource.accepted(),
        Operation::ReadProgress    => resource.participation.is_some(),
    };

    if granted {
        Access::Allow
    } else if admin {
        Access::ReadOnly
    } else {
        Access::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: UserRole  = UserRole::User;
    const ADMIN: UserRole = UserRole::Admin;

    #[test]
    fn authors_and_accepted_participants_view_challenges() {
        let author = Resource { is_author: true, participation: Some(true) };
        assert_eq!(check(USER, Operation::ViewChallenge, &author), Access::Allow);
        assert_eq!(check(USER, Operation::ViewChallenge, &Resource::participant(true)), Access::Allow);
    }

    #[test]
    fn pending_invitees_and_outsiders_cannot_view() {
        assert_eq!(check(USER, Operation::ViewChallenge, &Resource::participant(false)), Access::Deny);
        assert_eq!(check(USER, Operation::ViewChallenge, &Resource::outsider()), Access::Deny);
    }

    #[test]
    fn admins_view_everything_read_only() {
        let access = check(ADMIN, Operation::ViewChallenge, &Resource::outsider());
        assert_eq!(access, Access::ReadOnly);
        assert!(access.can_read());
    }

    #[test]
    fn only_admins_delete() {
        let author = Resource { is_author: true, participation: Some(true) };
        assert_eq!(check(USER, Operation::DeleteChallenge, &author), Access::Deny);
        assert_eq!(check(ADMIN, Operation::DeleteChallenge, &Resource::outsider()), Access::Allow);
    }

    #[test]
    fn writing_progress_needs_an_accepted_participation() {
        assert_eq!(check(USER, Operation::WriteProgress, &Resource::participant(true)), Access::Allow);
        assert_eq!(check(USER, Operation::WriteProgress, &Resource::participant(false)), Access::Deny);
        assert_eq!(check(USER, Operation::WriteProgress, &Resource::outsider()), Access::Deny);
        assert_eq!(check(ADMIN, Operation::WriteProgress, &Resource::outsider()), Access::ReadOnly);
    }

    #[test]
    fn admin_participants_write_like_everyone_else() {
        assert_eq!(check(ADMIN, Operation::WriteProgress, &Resource::participant(true)), Access::Allow);
    }

    #[test]
    fn reading_progress_needs_any_participation() {
        assert_eq!(check(USER, Operation::ReadProgress, &Resource::participant(false)), Access::Allow);
        assert_eq!(check(USER, Operation::ReadProgress, &Resource::outsider()), Access::Deny);
        assert_eq!(check(ADMIN, Operation::ReadProgress, &Resource::outsider()), Access::ReadOnly);
        assert!(!Access::Deny.can_read());
    }
}
