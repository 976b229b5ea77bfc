pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;

pub use db::DbPool;

use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::TokenService;
use crate::chat::{ChatRouter, ConnectionRegistry};
use crate::config::Config;
use crate::db::Store;

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub tokens: TokenService,
    pub registry: Arc<ConnectionRegistry>,
    pub chat: ChatRouter,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let store = Store::new(db);
        let tokens = TokenService::new(&config.auth.jwt_secret, config.auth.token_ttl_days);
        let registry = Arc::new(ConnectionRegistry::new());
        let chat = ChatRouter::new(store.clone(), tokens.clone(), registry.clone());
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            store,
            tokens,
            registry,
            chat,
            rate_limiter,
        }
    }
}
