//! `bioboxsys-auth`: session and permission resolution for BioBoxsys.
//!
//! This crate is decoupled from HTTP and from the hosted backend: the
//! credential service, profile store and local slot are traits, implemented
//! by `bioboxsys-supabase` in production and by [`memory`] in tests.

pub mod authorize;
pub mod compat;
pub mod config;
pub mod demo;
pub mod identity;
pub mod memory;
pub mod modules;
pub mod permissions;
pub mod provision;
pub mod remote;
pub mod resolve;
pub mod roles;
pub mod session;
pub mod slot;

pub use authorize::{check_permission, evaluate, PermissionDecision};
pub use compat::{CompatTableError, CompatibilityTable};
pub use config::{AuthConfig, ConfigError};
pub use demo::{DemoDirectory, DEMO_PASSWORD};
pub use identity::{Identity, Principal, ProfileRow};
pub use modules::Module;
pub use permissions::Permission;
pub use provision::{provision_user, NewUserRequest, ProvisionError, ProvisionedUser};
pub use remote::{
    AdminAuthService, AuthService, AuthServiceError, ProfileStore, ProfileStoreError,
    SessionEvent, UnconfiguredAuthService,
};
pub use resolve::IdentityResolver;
pub use roles::Role;
pub use session::{LoginError, SessionManager, SessionState, GENERIC_LOGIN_ERROR};
pub use slot::{FileSlot, LocalSlot, MemorySlot, SlotError, CACHED_IDENTITY_KEY};
