//! Role flags.

use serde::{Deserialize, Serialize};

/// The two elevated flags a user can carry.
///
/// Buyers have neither flag. Sellers and admins may see every order, mark
/// orders delivered and read the sales summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roles {
    pub is_admin: bool,
    pub is_seller: bool,
}

impl Roles {
    pub const BUYER: Self = Self {
        is_admin: false,
        is_seller: false,
    };

    #[must_use]
    pub const fn new(is_admin: bool, is_seller: bool) -> Self {
        Self {
            is_admin,
            is_seller,
        }
    }

    /// Whether these roles grant cross-user order management.
    #[must_use]
    pub const fn can_manage_orders(&self) -> bool {
        self.is_admin || self.is_seller
    }
}
