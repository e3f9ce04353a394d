pub mod config;
pub mod error;
pub mod logging;
pub mod page;
pub mod routes;
pub mod state;
pub mod store;

pub use config::{Settings, get_configuration};
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
pub use store::SessionStore;
