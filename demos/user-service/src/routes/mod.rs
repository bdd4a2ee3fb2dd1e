//! Routers of the user service.

pub mod health;
pub mod user;

pub use health::health_router;
pub use user::{scoped_user_router, user_router, user_router_with};
