use std::sync::Arc;

use app_state::AppState;
use axum::http::{header::CONTENT_TYPE, Method};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    error::OpsResult,
    settings::{ServerArgs, Settings},
};

pub mod app_state;
mod routes;
pub(crate) mod utils;

#[derive(Debug)]
pub struct Server {
    args: ServerArgs,
    settings: Settings,
}

impl Server {
    pub async fn new(args: ServerArgs, settings: Settings) -> Self {
        Self { args, settings }
    }

    pub async fn run(&self) -> OpsResult<()> {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(Any)
            .allow_headers([CONTENT_TYPE]);

        let app_state = AppState::new(self.settings.clone())?;
        let shared_state = Arc::new(app_state);

        let app = routes::routes(shared_state);
        let app = app.layer(cors);

        info!(
            "Server started successfully at http://0.0.0.0:{}",
            self.args.port
        );

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.args.port)).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
