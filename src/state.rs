use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::rate_limit::RateLimiter;
use crate::store::Store;

/// Everything a request may touch, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub auth: AuthService,
    pub limiter: RateLimiter,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn Store>) -> Self {
        let auth = AuthService::new(&config.jwt_secret, config.jwt_expires_in, config.bcrypt_cost);
        let limiter = RateLimiter::new(config.rate_limit_max, config.rate_limit_window);

        Self {
            config: Arc::new(config),
            store,
            auth,
            limiter,
            pipeline: Arc::new(Pipeline::standard()),
        }
    }
}
