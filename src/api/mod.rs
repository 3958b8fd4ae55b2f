pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::{create_router, serve};
pub use state::AppState;
