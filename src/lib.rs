use config::Config;
use generation::ButtonGenerator;
use limiter::RateLimiter;
use std::sync::Arc;

pub mod coerce;
pub mod config;
pub mod error;
pub mod generation;
pub mod limiter;
pub mod middleware;
pub mod normalize;
pub mod router;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub generator: Arc<dyn ButtonGenerator>,
    pub global_limiter: Arc<RateLimiter>,
    pub generate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, generator: Arc<dyn ButtonGenerator>) -> Self {
        let global_limiter = Arc::new(RateLimiter::new("global", config.global_rate_limit()));
        let generate_limiter = Arc::new(RateLimiter::new("generate", config.generate_rate_limit()));
        Self {
            config,
            generator,
            global_limiter,
            generate_limiter,
        }
    }
}
