//! `bioboxsys-supabase`: adapters binding `bioboxsys-auth`'s remote
//! contracts to a hosted Supabase project (GoTrue auth + PostgREST).

mod wire;

pub mod auth;
pub mod config;
pub mod profiles;

pub use auth::SupabaseAuth;
pub use config::{SupabaseConfig, SupabaseConfigError};
pub use profiles::SupabaseProfileStore;
