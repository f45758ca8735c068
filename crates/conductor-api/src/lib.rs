pub mod app;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod patch;
pub mod state;

pub use app::build_app;
pub use state::AppState;
