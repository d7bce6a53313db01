use crate::state::AppState;
use axum::Router;

mod claims;
pub mod cookies;
pub mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod jwt;
pub mod session;
pub mod tokens;

pub fn router() -> Router<AppState> {
    handlers::session_routes()
}
