//! Redis Streams queue provider.
//!
//! Each queue is a stream `<prefix><queue>` read through one shared consumer
//! group, so every entry is claimed by exactly one consumer at a time.
//!
//! - publish: `XADD` with a `payload` field
//! - claim: `XAUTOCLAIM` for entries idle longer than `claim_idle_ms`, then
//!   `XREADGROUP ... >` for new entries
//! - ack: `XACK`
//! - nack: `XCLAIM ... IDLE` so the entry is immediately reclaimable
//! - entries delivered more than `max_deliveries` times move to
//!   `<prefix><queue>:dead` and are acknowledged

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamReadOptions, StreamReadReply,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use audiopipe_core::config::RedisBrokerConfig;
use audiopipe_core::error::{AppError, ErrorKind};
use audiopipe_core::result::AppResult;
use audiopipe_core::traits::broker::{Acknowledger, Delivery, DeliveryStream, MessageBroker};

use super::client::RedisClient;

fn map_err(context: &str, e: redis::RedisError) -> AppError {
    AppError::with_source(ErrorKind::Broker, format!("{context}: {e}"), e)
}

/// Redis Streams-backed broker.
#[derive(Debug, Clone)]
pub struct RedisStreamsBroker {
    client: RedisClient,
    group: String,
    batch_size: usize,
    block_ms: u64,
    claim_idle_ms: u64,
    max_deliveries: u64,
    closed: CancellationToken,
}

impl RedisStreamsBroker {
    /// Create a broker on an established client.
    pub fn new(client: RedisClient, config: &RedisBrokerConfig) -> Self {
        Self {
            client,
            group: config.consumer_group.clone(),
            batch_size: config.batch_size.max(1),
            block_ms: config.block_ms,
            claim_idle_ms: config.claim_idle_ms,
            max_deliveries: config.max_deliveries,
            closed: CancellationToken::new(),
        }
    }

    fn stream_key(&self, queue: &str) -> String {
        self.client.prefixed_key(queue)
    }

    /// Create the consumer group (and the stream) if missing.
    async fn ensure_group(&self, conn: &mut ConnectionManager, stream_key: &str) -> AppResult<()> {
        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(stream_key, &self.group, "0").await;
        match created {
            Ok(()) => {
                info!(stream = %stream_key, group = %self.group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(map_err("XGROUP CREATE failed", e)),
        }
    }
}

#[async_trait]
impl MessageBroker for RedisStreamsBroker {
    async fn publish(&self, queue: &str, payload: Bytes) -> AppResult<String> {
        if self.closed.is_cancelled() {
            return Err(AppError::broker("Broker is closed"));
        }
        let stream_key = self.stream_key(queue);
        let published_at = chrono::Utc::now().to_rfc3339();
        let mut conn = self.client.conn_mut();

        let id: String = conn
            .xadd(
                &stream_key,
                "*",
                &[
                    ("payload", &payload[..]),
                    ("published_at", published_at.as_bytes()),
                ],
            )
            .await
            .map_err(|e| map_err("XADD failed", e))?;

        debug!(queue = %queue, message_id = %id, "Published message");
        Ok(id)
    }

    async fn consume(&self, queue: &str, consumer: &str) -> AppResult<DeliveryStream> {
        if self.closed.is_cancelled() {
            return Err(AppError::broker("Broker is closed"));
        }
        let stream_key = self.stream_key(queue);
        let mut conn = self
            .client
            .dedicated(Duration::from_millis(self.block_ms))
            .await?;
        self.ensure_group(&mut conn, &stream_key).await?;

        let acker = Arc::new(RedisAcker {
            conn: self.client.conn_mut(),
            stream_key: stream_key.clone(),
            group: self.group.clone(),
            consumer: consumer.to_string(),
            reclaim_idle_ms: self.claim_idle_ms,
        });

        info!(queue = %queue, consumer = %consumer, group = %self.group, "Subscribed to stream");

        let reader = StreamReader {
            conn,
            queue: queue.to_string(),
            stream_key,
            group: self.group.clone(),
            consumer: consumer.to_string(),
            batch_size: self.batch_size,
            block_ms: self.block_ms,
            claim_idle_ms: self.claim_idle_ms,
            max_deliveries: self.max_deliveries,
            acker,
            buffer: VecDeque::new(),
            closed: self.closed.clone(),
            failed: false,
        };

        let deliveries = stream::unfold(reader, |mut reader| async move {
            let item = reader.next_delivery().await?;
            Some((item, reader))
        });

        Ok(Box::pin(deliveries))
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("PING failed", e))?;
        Ok(pong == "PONG")
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.cancel();
        info!("Redis broker closed");
        Ok(())
    }
}

/// State behind one consumer stream.
struct StreamReader {
    conn: ConnectionManager,
    queue: String,
    stream_key: String,
    group: String,
    consumer: String,
    batch_size: usize,
    block_ms: u64,
    claim_idle_ms: u64,
    max_deliveries: u64,
    acker: Arc<RedisAcker>,
    buffer: VecDeque<Delivery>,
    closed: CancellationToken,
    failed: bool,
}

impl StreamReader {
    /// Yield the next delivery. `None` ends the stream (closed, or after an
    /// error has been yielded).
    async fn next_delivery(&mut self) -> Option<AppResult<Delivery>> {
        loop {
            if self.failed || self.closed.is_cancelled() {
                return None;
            }
            if let Some(delivery) = self.buffer.pop_front() {
                return Some(Ok(delivery));
            }

            let closed = self.closed.clone();
            let filled = tokio::select! {
                result = self.fill() => result,
                _ = closed.cancelled() => return None,
            };
            if let Err(e) = filled {
                error!(queue = %self.queue, error = %e, "Stream read failed");
                self.failed = true;
                return Some(Err(e));
            }
        }
    }

    async fn fill(&mut self) -> AppResult<()> {
        self.reclaim_idle().await?;
        if self.buffer.is_empty() {
            self.read_new().await?;
        }
        Ok(())
    }

    /// Take over entries another consumer claimed but never settled.
    async fn reclaim_idle(&mut self) -> AppResult<()> {
        let options = StreamAutoClaimOptions::default().count(self.batch_size);
        let reply: StreamAutoClaimReply = self
            .conn
            .xautoclaim_options(
                &self.stream_key,
                &self.group,
                &self.consumer,
                self.claim_idle_ms,
                "0-0",
                options,
            )
            .await
            .map_err(|e| map_err("XAUTOCLAIM failed", e))?;

        for entry in reply.claimed {
            let delivery_count = self.delivery_count(&entry.id).await?;
            if delivery_count > self.max_deliveries {
                self.dead_letter(&entry, delivery_count).await?;
                continue;
            }
            debug!(
                queue = %self.queue,
                delivery_id = %entry.id,
                delivery_count = delivery_count,
                "Reclaimed idle message"
            );
            self.push(entry, delivery_count);
        }
        Ok(())
    }

    async fn read_new(&mut self) -> AppResult<()> {
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(self.batch_size)
            .block(self.block_ms as usize);
        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.stream_key], &[">"], &options)
            .await
            .map_err(|e| map_err("XREADGROUP failed", e))?;

        for key in reply.map(|r| r.keys).unwrap_or_default() {
            for entry in key.ids {
                self.push(entry, 1);
            }
        }
        Ok(())
    }

    async fn delivery_count(&mut self, id: &str) -> AppResult<u64> {
        let reply: StreamPendingCountReply = self
            .conn
            .xpending_count(&self.stream_key, &self.group, id, id, 1)
            .await
            .map_err(|e| map_err("XPENDING failed", e))?;
        Ok(reply
            .ids
            .first()
            .map(|p| p.times_delivered as u64)
            .unwrap_or(1))
    }

    async fn dead_letter(&mut self, entry: &StreamId, delivery_count: u64) -> AppResult<()> {
        let payload: Vec<u8> = entry.get("payload").unwrap_or_default();
        let dead_key = format!("{}:dead", self.stream_key);
        let dead_at = chrono::Utc::now().to_rfc3339();
        let count = delivery_count.to_string();

        let _: String = self
            .conn
            .xadd(
                &dead_key,
                "*",
                &[
                    ("payload", payload.as_slice()),
                    ("original_id", entry.id.as_bytes()),
                    ("delivery_count", count.as_bytes()),
                    ("dead_at", dead_at.as_bytes()),
                ],
            )
            .await
            .map_err(|e| map_err("Dead-letter XADD failed", e))?;
        let _: i64 = self
            .conn
            .xack(&self.stream_key, &self.group, &[&entry.id])
            .await
            .map_err(|e| map_err("XACK failed", e))?;

        warn!(
            queue = %self.queue,
            delivery_id = %entry.id,
            delivery_count = delivery_count,
            "Message moved to dead-letter stream"
        );
        Ok(())
    }

    fn push(&mut self, entry: StreamId, delivery_count: u64) {
        let payload: Vec<u8> = entry.get("payload").unwrap_or_default();
        self.buffer.push_back(Delivery::new(
            entry.id,
            self.queue.clone(),
            Bytes::from(payload),
            delivery_count,
            self.acker.clone(),
        ));
    }
}

/// Settles deliveries of one consumer stream.
#[derive(Debug)]
struct RedisAcker {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
    reclaim_idle_ms: u64,
}

#[async_trait]
impl Acknowledger for RedisAcker {
    async fn ack(&self, delivery_id: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(&self.stream_key, &self.group, &[delivery_id])
            .await
            .map_err(|e| map_err("XACK failed", e))?;
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> AppResult<()> {
        // Backdate the idle time so the next XAUTOCLAIM picks it up.
        let mut conn = self.conn.clone();
        let _: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.stream_key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(0)
            .arg(delivery_id)
            .arg("IDLE")
            .arg(self.reclaim_idle_ms)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await
            .map_err(|e| map_err("XCLAIM failed", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::StreamExt;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    use audiopipe_core::config::BrokerConfig;

    use super::*;

    /// Serve RESP like a Redis holding an empty stream: every XREADGROUP
    /// waits out its full `block` before the null reply.
    async fn idle_stream_server(block: Duration, reads: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve_idle_stream(socket, block, reads.clone()));
            }
        });
        format!("redis://{addr}")
    }

    async fn read_command(reader: &mut BufReader<TcpStream>) -> Option<Vec<String>> {
        let mut line = String::new();
        if reader.read_line(&mut line).await.ok()? == 0 {
            return None;
        }
        let count: usize = line.trim_end().strip_prefix('*')?.parse().ok()?;
        let mut args = Vec::with_capacity(count);
        for _ in 0..count {
            line.clear();
            reader.read_line(&mut line).await.ok()?;
            let len: usize = line.trim_end().strip_prefix('$')?.parse().ok()?;
            let mut arg = vec![0u8; len + 2];
            reader.read_exact(&mut arg).await.ok()?;
            arg.truncate(len);
            args.push(String::from_utf8_lossy(&arg).to_ascii_uppercase());
        }
        Some(args)
    }

    async fn serve_idle_stream(socket: TcpStream, block: Duration, reads: Arc<AtomicUsize>) {
        let mut reader = BufReader::new(socket);
        while let Some(args) = read_command(&mut reader).await {
            let reply: &[u8] = match args.first().map(String::as_str) {
                Some("XAUTOCLAIM") => b"*3\r\n$3\r\n0-0\r\n*0\r\n*0\r\n",
                Some("XREADGROUP") => {
                    reads.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(block).await;
                    b"*-1\r\n"
                }
                _ => b"+OK\r\n",
            };
            if reader.get_mut().write_all(reply).await.is_err() {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_idle_blocking_read_does_not_fail_the_stream() {
        // Longer than the client library's default 500ms response timeout.
        let block = Duration::from_millis(800);
        let reads = Arc::new(AtomicUsize::new(0));
        let url = idle_stream_server(block, reads.clone()).await;
        let config = BrokerConfig {
            provider: "redis".to_string(),
            connect_timeout_seconds: 1,
            connect_retries: 0,
            redis: RedisBrokerConfig {
                url,
                block_ms: block.as_millis() as u64,
                ..Default::default()
            },
            ..BrokerConfig::default()
        };

        let client = RedisClient::connect(&config).await.unwrap();
        let broker = RedisStreamsBroker::new(client, &config.redis);
        let mut deliveries = broker.consume("conversion", "worker-1").await.unwrap();

        let next = tokio::time::timeout(Duration::from_millis(2000), deliveries.next()).await;
        assert!(next.is_err(), "idle stream yielded {next:?}");
        assert!(reads.load(Ordering::SeqCst) >= 2);
    }
}
