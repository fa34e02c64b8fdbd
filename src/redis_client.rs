use redis::aio::ConnectionManager;
use redis::RedisResult;

/// Opens a `ConnectionManager` that reconnects on failure.
///
/// The manager is cheaply cloneable and every clone shares one multiplexed
/// connection, so the store clones it per operation instead of pooling.
pub async fn connect(url: &str) -> RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    let conn = ConnectionManager::new(client).await?;
    tracing::info!("connected to redis");
    Ok(conn)
}
