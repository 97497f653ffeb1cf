use dotenvy::dotenv;
use tracing::info;

use pairly_api::infra::{app::create_app, error::InfraError, setup::init_app_state};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let app_state = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(InfraError::TcpBind)?;

    info!("Backend listening at {}", &listener.local_addr()?);

    axum::serve(listener, app)
        .await
        .map_err(InfraError::Server)?;

    Ok(())
}
