//! Static demo directory used when the credential service is unavailable.

use bioboxsys_core::UserId;

use crate::identity::Identity;
use crate::{Permission, Role};

/// The single password accepted for every demo account.
pub const DEMO_PASSWORD: &str = "password";

#[derive(Debug, Clone)]
pub struct DemoDirectory {
    users: Vec<Identity>,
}

impl DemoDirectory {
    pub fn new(users: Vec<Identity>) -> Self {
        Self { users }
    }

    /// Seed accounts matching the sample data shipped with the application.
    pub fn builtin() -> Self {
        let seller_perms = || {
            vec![
                Permission::from("orders:create"),
                Permission::from("orders:read"),
                Permission::from("customers:create"),
                Permission::from("customers:read"),
            ]
        };

        Self::new(vec![
            Identity {
                id: UserId::new("550e8400-e29b-41d4-a716-446655440000"),
                display_name: "Administrator".into(),
                email: "admin@bioboxsys.com".into(),
                role: Role::Admin,
                permissions: vec![Permission::universal()],
            },
            Identity {
                id: UserId::new("550e8400-e29b-41d4-a716-446655440001"),
                display_name: "Carlos Vendedor".into(),
                email: "carlos@bioboxsys.com".into(),
                role: Role::Seller,
                permissions: seller_perms(),
            },
            Identity {
                id: UserId::new("550e8400-e29b-41d4-a716-446655440002"),
                display_name: "Ana Vendedora".into(),
                email: "ana@bioboxsys.com".into(),
                role: Role::Seller,
                permissions: seller_perms(),
            },
        ])
    }

    pub fn users(&self) -> &[Identity] {
        &self.users
    }

    /// Identity for `email` if `password` is the demo password.
    pub fn authenticate(&self, email: &str, password: &str) -> Option<Identity> {
        if password != DEMO_PASSWORD {
            return None;
        }
        let email = email.trim();
        self.users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
    }
}

impl Default for DemoDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_the_demo_password() {
        let dir = DemoDirectory::builtin();
        let admin = dir.authenticate("admin@bioboxsys.com", DEMO_PASSWORD).unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(dir.authenticate("admin@bioboxsys.com", "admin").is_none());
        assert!(dir.authenticate("nobody@bioboxsys.com", DEMO_PASSWORD).is_none());
    }

    #[test]
    fn email_match_ignores_case_and_padding() {
        let dir = DemoDirectory::builtin();
        let carlos = dir.authenticate(" Carlos@BioBoxsys.com ", DEMO_PASSWORD).unwrap();
        assert_eq!(carlos.display_name, "Carlos Vendedor");
    }
}
