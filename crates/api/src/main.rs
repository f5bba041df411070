use std::sync::Arc;

use anyhow::Context;

use bioboxsys_api::app::{build_app, AppState};
use bioboxsys_auth::{memory::InMemoryProfileStore, UnconfiguredAuthService};
use bioboxsys_supabase::{SupabaseAuth, SupabaseConfig, SupabaseConfigError, SupabaseProfileStore};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

fn app_state() -> anyhow::Result<AppState> {
    match SupabaseConfig::from_env() {
        Ok(config) => {
            let profiles = SupabaseProfileStore::service_role(config.clone())
                .context("SUPABASE_SERVICE_ROLE_KEY is required to serve admin requests")?;
            Ok(AppState::new(
                Arc::new(SupabaseAuth::new(config)),
                Arc::new(profiles),
            ))
        }
        Err(SupabaseConfigError::Missing(key)) => {
            tracing::warn!(%key, "credential service not configured; admin requests will be refused");
            Ok(AppState::new(
                Arc::new(UnconfiguredAuthService::new()),
                Arc::new(InMemoryProfileStore::new()),
            ))
        }
        Err(err) => Err(err).context("invalid Supabase configuration"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bioboxsys_observability::init();

    let app = build_app(app_state()?);

    let addr = std::env::var("BIOBOX_API_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
