use std::sync::Arc;

use crate::booking::BookingService;
use crate::config::Config;
use crate::store::BookingStore;

/// Shared application state, built once at startup.
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub bookings: BookingService,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn BookingStore>, config: Config) -> Self {
        AppState {
            bookings: BookingService::new(store.clone()),
            store,
            config,
        }
    }
}
