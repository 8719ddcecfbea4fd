//! Account credential checks and the admin rule.
//!
//! Passwords are stored as submitted; comparison is constant-time so that a
//! mismatch does not leak how many leading bytes matched.

use subtle::ConstantTimeEq;

use crate::models::User;

/// The account allowed through admin-only routes.
pub const ADMIN_USER_ID: i64 = 1;

pub fn password_matches(user: &User, candidate: &str) -> bool {
    user.password.as_bytes().ct_eq(candidate.as_bytes()).into()
}

pub fn is_admin(user: &User) -> bool {
    user.id == ADMIN_USER_ID
}
