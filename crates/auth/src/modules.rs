//! Catalog of application modules guarded by permissions.

use serde::{Deserialize, Serialize};

/// A top-level area of the application.
///
/// Catalog order matters: it is the preference order used when picking a
/// landing module for an identity that was denied somewhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Dashboard,
    Orders,
    Customers,
    Production,
    Products,
    Settings,
}

impl Module {
    pub const CATALOG: [Module; 6] = [
        Module::Dashboard,
        Module::Orders,
        Module::Customers,
        Module::Production,
        Module::Products,
        Module::Settings,
    ];

    /// Name used in permission tokens (`"orders:view"`, `"orders-full"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Dashboard => "dashboard",
            Module::Orders => "orders",
            Module::Customers => "customers",
            Module::Production => "production",
            Module::Products => "products",
            Module::Settings => "settings",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Module::Dashboard => "/",
            Module::Orders => "/orders",
            Module::Customers => "/customers",
            Module::Production => "/production",
            Module::Products => "/products",
            Module::Settings => "/settings",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Module::Dashboard => "Dashboard",
            Module::Orders => "Pedidos",
            Module::Customers => "Clientes",
            Module::Production => "Produção",
            Module::Products => "Produtos",
            Module::Settings => "Configurações",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::CATALOG.into_iter().find(|m| m.as_str() == name)
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::CATALOG.into_iter().find(|m| m.path() == path)
    }
}

impl core::fmt::Display for Module {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action checked when deciding whether a module is visible at all.
pub const VIEW_ACTION: &str = "view";

/// Modules for which `can_view` holds, in catalog order.
pub fn visible_modules(can_view: impl Fn(Module) -> bool) -> Vec<Module> {
    Module::CATALOG.into_iter().filter(|m| can_view(*m)).collect()
}

/// First module in catalog order for which `can_view` holds.
pub fn landing_module(can_view: impl Fn(Module) -> bool) -> Option<Module> {
    Module::CATALOG.into_iter().find(|m| can_view(*m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_round_trip_through_catalog() {
        for module in Module::CATALOG {
            assert_eq!(Module::from_name(module.as_str()), Some(module));
            assert_eq!(Module::from_path(module.path()), Some(module));
        }
        assert_eq!(Module::from_name("reports"), None);
    }

    #[test]
    fn landing_prefers_catalog_order() {
        let landing = landing_module(|m| matches!(m, Module::Products | Module::Orders));
        assert_eq!(landing, Some(Module::Orders));
        assert_eq!(landing_module(|_| false), None);
    }

    #[test]
    fn visible_keeps_order() {
        let visible = visible_modules(|m| m != Module::Settings);
        assert_eq!(visible.len(), 5);
        assert_eq!(visible[0], Module::Dashboard);
    }
}
