//! HTTP API handlers for courtstats-agg

pub mod auth;
pub mod health;
pub mod reconcile;
pub mod upload;

pub use auth::{auth_middleware, Identity, IdentityVerifier, TokenAllowlist};
pub use health::health_routes;
pub use reconcile::{reconcile_active, reconcile_season, request_cache_rebuild};
pub use upload::upload_boxscore;
