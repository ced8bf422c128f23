//! Redis pub/sub adapter.
//!
//! Publishes over one cached multiplexed connection instead of a connection
//! per publish. Concurrent publishes are pipelined on it without interfering.
//! Any connection-level failure discards the cached connection so the next
//! attempt dials again.
//! Each subscription gets its own dedicated pub/sub connection.

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::application::ports::{BusError, BusStream, MessageBus};

/// Redis-backed [`MessageBus`].
pub struct RedisBus {
    client: redis::Client,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBus {
    /// Create an adapter for `host:port`. No connection is made until first use.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Backend`] if the address is not a valid Redis URL.
    pub fn new(host: &str, port: u16) -> Result<Self, BusError> {
        let client = redis::Client::open(format!("redis://{host}:{port}/"))
            .map_err(|e| BusError::Backend(e.to_string()))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, BusError> {
        let cached = self.connection.lock().clone();
        if let Some(connection) = cached {
            return Ok(connection);
        }

        let connection = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_error)?;
        tracing::info!("Connected to Redis");
        *self.connection.lock() = Some(connection.clone());
        Ok(connection)
    }

    fn discard_connection(&self) {
        self.connection.lock().take();
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut connection = self.connection().await?;
        let result: redis::RedisResult<i64> = connection.publish(channel, payload).await;

        result.map(|_| ()).map_err(|e| {
            let error = map_error(e);
            if error.is_connection() {
                self.discard_connection();
            }
            error
        })
    }

    async fn subscribe(&self, channel: &str) -> Result<BusStream, BusError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(map_error)?;
        pubsub.subscribe(channel).await.map_err(map_error)?;

        let stream = pubsub.into_on_message().map(|message| {
            message
                .get_payload::<String>()
                .map_err(|e| BusError::Backend(e.to_string()))
        });
        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("connection_info", self.client.get_connection_info())
            .field("connected", &self.connection.lock().is_some())
            .finish()
    }
}

fn map_error(error: redis::RedisError) -> BusError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        BusError::Connection(error.to_string())
    } else {
        BusError::Backend(error.to_string())
    }
}
