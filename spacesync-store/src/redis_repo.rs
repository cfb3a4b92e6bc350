use tracing::info;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured for rate limiting");
        Ok(Self { client })
    }

    /// Fixed-window counter. The window starts at the first request and its TTL
    /// is never extended by later ones. Returns false once `limit` requests
    /// were seen in the window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> redis::RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(key)
            .arg(0)
            .arg("EX")
            .arg(window_seconds)
            .arg("NX")
            .ignore()
            .incr(key, 1)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}
