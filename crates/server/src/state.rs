use crate::{config::Config, store::RosterStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RosterStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn RosterStore>, config: Config) -> Self {
        Self { store, config }
    }
}
