use crate::config::{ConfigError, Settings};
use crate::entity::EntityModel;
use crate::routing::JwtRouter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub router: JwtRouter,
}

impl AppState {
    pub fn new(settings: Settings, models: Vec<Arc<dyn EntityModel>>) -> Result<Self, ConfigError> {
        let router = JwtRouter::from_settings(&settings, models)?;
        Ok(Self {
            settings: Arc::new(settings),
            router,
        })
    }
}
