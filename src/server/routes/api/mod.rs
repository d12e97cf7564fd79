use axum::Router;

use crate::server::app_state::SharedAppState;

pub mod healthcheck;
pub mod projects;
pub mod stream;
pub mod uploads;

pub fn routes(app_state: SharedAppState) -> Router<SharedAppState> {
    Router::new()
        .merge(healthcheck::routes(app_state.clone()))
        .merge(projects::routes(app_state.clone()))
        .merge(uploads::routes(app_state.clone()))
        .merge(stream::routes(app_state.clone()))
        .with_state(app_state)
}
