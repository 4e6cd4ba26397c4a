use std::sync::{Arc, RwLock};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub dispatcher: Arc<Dispatcher>,
    pub config: Arc<RwLock<Config>>,
}

impl AppState {
    pub fn new(pool: Pool, dispatcher: Arc<Dispatcher>) -> Self {
        let config = dispatcher.config_handle();
        Self {
            pool,
            dispatcher,
            config,
        }
    }
}
