/*!
 * # Permissions Module
 *
 * Permission strings are `resource:action` pairs. There is no per-user
 * permission storage: the set a caller holds is derived entirely from the
 * role claim in their token.
 */

/// Campus roles carried in the token's `role` claim
pub mod roles {
    pub const STUDENT: &str = "student";
    pub const STAFF: &str = "staff";
    pub const ADMIN: &str = "admin";
}

/// Permission string constants for compile-time safety
pub mod consts {
    // Menu
    pub const MENU_WRITE: &str = "menu:write";
    pub const MENU_DELETE: &str = "menu:delete";

    // Orders
    pub const ORDERS_READ: &str = "orders:read";
    pub const ORDERS_CREATE: &str = "orders:create";
    pub const ORDERS_MANAGE: &str = "orders:manage";

    // Invoices
    pub const INVOICES_READ: &str = "invoices:read";
    pub const INVOICES_ISSUE: &str = "invoices:issue";
}

/// Permissions granted to a role. Unknown roles get nothing.
pub fn role_permissions(role: &str) -> &'static [&'static str] {
    match role {
        roles::ADMIN => &[
            consts::MENU_WRITE,
            consts::MENU_DELETE,
            consts::ORDERS_READ,
            consts::ORDERS_CREATE,
            consts::ORDERS_MANAGE,
            consts::INVOICES_READ,
            consts::INVOICES_ISSUE,
        ],
        roles::STAFF => &[
            consts::MENU_WRITE,
            consts::ORDERS_READ,
            consts::ORDERS_CREATE,
            consts::ORDERS_MANAGE,
            consts::INVOICES_READ,
            consts::INVOICES_ISSUE,
        ],
        roles::STUDENT => &[
            consts::ORDERS_READ,
            consts::ORDERS_CREATE,
            consts::INVOICES_READ,
        ],
        _ => &[],
    }
}
