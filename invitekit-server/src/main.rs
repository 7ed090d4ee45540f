//! Invitekit server.
//!
//! Serves the client-invitation endpoint against the Supabase project
//! configured in the environment.

use std::sync::Arc;

use invitekit_axum::{router, AppState};
use invitekit_core::InviteFlow;
use invitekit_supabase::{GoTrueAdmin, PostgrestClientStore, SupabaseConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct ServerConfig {
    supabase: SupabaseConfig,
    port: u16,
}

impl ServerConfig {
    fn from_env() -> anyhow::Result<Self> {
        let supabase = SupabaseConfig::from_env()?;
        let port = std::env::var("PORT")
            .ok()
            .and_then(|port| port.parse().ok())
            .unwrap_or(8000);
        Ok(Self { supabase, port })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let supabase = Arc::new(config.supabase);
    let http = reqwest::Client::new();

    let gotrue = Arc::new(GoTrueAdmin::new(http.clone(), supabase.clone()));
    let store = Arc::new(PostgrestClientStore::new(http, supabase));
    let flow = InviteFlow::new(gotrue.clone(), store, gotrue);

    let app = router(AppState::new(flow));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
