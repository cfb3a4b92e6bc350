use std::sync::Arc;

use spacesync_booking::{BookingCanceller, BookingLimits, BookingTransactor, ExpirySweeper, FreeRoomFinder};
use spacesync_core::Store;
use spacesync_store::app_config::BookingRules;
use spacesync_store::RedisClient;
use spacesync_timetable::{RoomRegistry, TextExtractor, TimetableImporter, TimetableParser};

use crate::metrics::Metrics;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub redis: Option<Arc<RedisClient>>,
    pub transactor: Arc<BookingTransactor>,
    pub canceller: Arc<BookingCanceller>,
    pub sweeper: Arc<ExpirySweeper>,
    pub finder: Arc<FreeRoomFinder>,
    pub rooms: Arc<RoomRegistry>,
    pub importer: Arc<TimetableImporter>,
    pub metrics: Metrics,
    pub auth: AuthConfig,
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        extractor: Arc<dyn TextExtractor>,
        parser: Arc<dyn TimetableParser>,
        auth: AuthConfig,
        rules: &BookingRules,
    ) -> Result<Self, prometheus::Error> {
        let limits = BookingLimits {
            default_duration_minutes: rules.default_duration_minutes,
            max_duration_minutes: rules.max_duration_minutes,
        };

        Ok(Self {
            transactor: Arc::new(BookingTransactor::new(store.clone(), limits)),
            canceller: Arc::new(BookingCanceller::new(store.clone())),
            sweeper: Arc::new(ExpirySweeper::new(store.clone())),
            finder: Arc::new(FreeRoomFinder::new(store.clone())),
            rooms: Arc::new(RoomRegistry::new(store.clone())),
            importer: Arc::new(TimetableImporter::new(store.clone(), extractor, parser)),
            metrics: Metrics::new()?,
            redis: None,
            store,
            auth,
            cors_origins: Vec::new(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        })
    }

    pub fn with_redis(mut self, redis: Arc<RedisClient>) -> Self {
        self.redis = Some(redis);
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}
