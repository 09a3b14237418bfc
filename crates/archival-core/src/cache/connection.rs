//! Redis connection management with pooling

use crate::cache::{CacheResult, CacheError, RedisConfig};
use redis::{
    aio::ConnectionManager,
    Client as RedisClient,
    Cmd,
    Pipeline,
    Value,
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn, error, debug};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    /// Redis client
    client: Arc<RedisClient>,
    
    /// Connection manager for async operations
    manager: Arc<RwLock<Option<ConnectionManager>>>,
    
    /// Configuration
    config: Arc<RedisConfig>,
    
    /// Connection state tracking
    state: Arc<RwLock<ConnectionState>>,
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Connected and ready
    Connected,
    
    /// Disconnected, attempting reconnect
    Reconnecting,
    
    /// Failed, manual intervention needed
    Failed,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub async fn new(config: RedisConfig) -> CacheResult<Self> {
        // Create Redis client
        let client = RedisClient::open(&config.url[..])
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        
        let pool = Self {
            client: Arc::new(client),
            manager: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
            state: Arc::new(RwLock::new(ConnectionState::Failed)),
        };
        
        // Initial connection
        pool.reconnect().await?;
        
        info!("Redis pool created: url={}", pool.config.url);
        
        Ok(pool)
    }
    
    /// Get a connection from the pool
    pub async fn get(&self) -> CacheResult<RedisConnection> {
        // Check state
        let state = *self.state.read().await;
        
        match state {
            ConnectionState::Connected => {
                // Try to get manager
                let manager_opt = self.manager.read().await;
                if let Some(manager) = manager_opt.as_ref() {
                    Ok(RedisConnection {
                        manager: manager.clone(),
                        config: self.config.clone(),
                    })
                } else {
                    // No manager available, try to reconnect
                    drop(manager_opt);
                    self.reconnect().await?;
                    
                    // Retry getting connection
                    let manager_opt = self.manager.read().await;
                    if let Some(manager) = manager_opt.as_ref() {
                        Ok(RedisConnection {
                            manager: manager.clone(),
                            config: self.config.clone(),
                        })
                    } else {
                        Err(CacheError::ConnectionError("No connection available".to_string()))
                    }
                }
            }
            ConnectionState::Reconnecting => {
                // Wait a bit and retry
                tokio::time::sleep(self.config.retry_delay()).await;
                self.get().await
            }
            ConnectionState::Failed => {
                // Attempt reconnect
                self.reconnect().await?;
                self.get().await
            }
        }
    }
    
    /// Reconnect to Redis
    pub async fn reconnect(&self) -> CacheResult<()> {
        // Set state to reconnecting
        *self.state.write().await = ConnectionState::Reconnecting;
        
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Redis reconnect attempt: {}", attempt);
            
            match self.attempt_connect().await {
                Ok(manager) => {
                    *self.manager.write().await = Some(manager);
                    *self.state.write().await = ConnectionState::Connected;
                    info!("Redis reconnected successfully after {} attempts", attempt);
                    return Ok(());
                }
                Err(e) => {
                    error!("Redis connection attempt {} failed: {}", attempt, e);
                    
                    if attempt >= self.config.max_retries {
                        *self.state.write().await = ConnectionState::Failed;
                        return Err(CacheError::ConnectionError(
                            format!("Failed to connect after {} attempts: {}", attempt, e)
                        ));
                    }
                    
                    // Wait before retry
                    tokio::time::sleep(self.config.retry_delay()).await;
                }
            }
        }
    }
    
    /// Attempt a single connection
    async fn attempt_connect(&self) -> CacheResult<ConnectionManager> {
        // Create connection manager
        let manager = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        
        // Validate connection with PING
        let mut cmd = Cmd::new();
        cmd.arg("PING");
        
        let result: String = manager.send_packed_command(&cmd, redis::RedisWrite::len, |buf| buf.to_vec())
            .await
            .map_err(|e| CacheError::ConnectionError(e.to_string()))?;
        
        if result != "PONG" {
            return Err(CacheError::ConnectionError("Redis PING failed".to_string()));
        }
        
        Ok(manager)
    }
    
    /// Check if pool is healthy
    pub async fn health_check(&self) -> CacheResult<bool> {
        let state = *self.state.read().await;
        
        match state {
            ConnectionState::Connected => {
                // Try to execute a PING
                match self.get().await {
                    Ok(conn) => {
                        // Simple health check via connection
                        Ok(true)
                    }
                    Err(_) => {
                        // Connection failed, mark as failed
                        *self.state.write().await = ConnectionState::Failed;
                        Ok(false)
                    }
                }
            }
            _ => Ok(false),
        }
    }
    
    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let state = *self.state.read().await;
        let manager_count = if self.manager.read().await.is_some() { 1 } else { 0 };
        
        PoolStats {
            state,
            active_connections: manager_count,
            max_connections: self.config.pool_size,
            url: self.config.url.clone(),
        }
    }
    
    /// Close the pool and cleanup
    pub async fn close(&self) -> CacheResult<()> {
        info!("Closing Redis pool");
        
        // Set state to failed
        *self.state.write().await = ConnectionState::Failed;
        
        // Drop manager
        *self.manager.write().await = None;
        
        Ok(())
    }
}

impl Drop for RedisPool {
    fn drop(&mut self) {
        // Note: Can't use async in drop, so we just log
        // In production, explicitly call close() before dropping
        debug!("RedisPool dropped");
    }
}

/// Single Redis connection wrapper
pub struct RedisConnection {
    /// Connection manager
    manager: ConnectionManager,
    
    /// Configuration reference
    config: Arc<RedisConfig>,
}

impl RedisConnection {
    /// Execute a Redis command
    pub async fn execute(&mut self, cmd: Cmd) -> CacheResult<Value> {
        Ok(self.manager.send_packed_command(
            &cmd,
            redis::RedisWrite::len,
            |buf| buf.to_vec(),
        ).await.map_err(|e| CacheError::OperationError(e.to_string()))?)
    }
    
    /// Execute a Redis pipeline
    pub async fn execute_pipeline(&mut self, pipeline: Pipeline) -> CacheResult<Vec<Value>> {
        Ok(self.manager.send_packed_commands(
            &pipeline,
            redis::RedisWrite::len,
            |buf| buf.to_vec(),
            0, // Start from first command
        ).await.map_err(|e| CacheError::OperationError(e.to_string()))?)
    }
    
    /// Set a key with TTL
    pub async fn setex(&mut self, key: &str, ttl_secs: u64, value: &[u8]) -> CacheResult<()> {
        let mut cmd = Cmd::new();
        cmd.arg("SETEX").arg(key).arg(ttl_secs).arg(value);
        
        let result: String = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::SerializationError(e.to_string()))?;
        
        if result != "OK" {
            return Err(CacheError::OperationError("SETEX failed".to_string()));
        }
        
        Ok(())
    }
    
    /// Get a key
    pub async fn get(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut cmd = Cmd::new();
        cmd.arg("GET").arg(key);
        
        let result = self.execute(cmd).await?;
        
        match result {
            redis::Value::Nil => Ok(None),
            redis::Value::BulkString(data) => Ok(Some(data)),
            _ => {
                let data: Vec<u8> = redis::from_redis_value(&result)
                    .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                Ok(Some(data))
            }
        }
    }
    
    /// Delete a key
    pub async fn del(&mut self, key: &str) -> CacheResult<bool> {
        let mut cmd = Cmd::new();
        cmd.arg("DEL").arg(key);
        
        let result: i32 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        
        Ok(result > 0)
    }
    
    /// Check if key exists
    pub async fn exists(&mut self, key: &str) -> CacheResult<bool> {
        let mut cmd = Cmd::new();
        cmd.arg("EXISTS").arg(key);
        
        let result: i32 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        
        Ok(result > 0)
    }
    
    /// Increment a counter
    pub async fn incr(&mut self, key: &str) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("INCR").arg(key);
        
        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        
        Ok(result)
    }
    
    /// Set key expiration
    pub async fn expire(&mut self, key: &str, ttl_secs: u64) -> CacheResult<bool> {
        let mut cmd = Cmd::new();
        cmd.arg("EXPIRE").arg(key).arg(ttl_secs);
        
        let result: i32 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        
        Ok(result > 0)
    }
    
    /// Get TTL for a key
    pub async fn ttl(&mut self, key: &str) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("TTL").arg(key);
        
        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;
        
        Ok(result)
    }
    
    /// Publish a message to a channel
    pub async fn publish(&mut self, channel: &str, message: &[u8]) -> CacheResult<u64> {
        let mut cmd = Cmd::new();
        cmd.arg("PUBLISH").arg(channel).arg(message);

        let result: u64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result)
    }

    /// Push a value onto the head of a list (used to enqueue at the front
    /// for redrive/requeue paths)
    pub async fn lpush(&mut self, key: &str, value: &[u8]) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("LPUSH").arg(key).arg(value);

        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result)
    }

    /// Push a value onto the tail of a list (normal enqueue path, FIFO with RPOP)
    pub async fn rpush(&mut self, key: &str, value: &[u8]) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("RPUSH").arg(key).arg(value);

        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result)
    }

    /// Pop the oldest value off a list (FIFO dequeue)
    pub async fn rpop(&mut self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut cmd = Cmd::new();
        cmd.arg("RPOP").arg(key);

        let result = self.execute(cmd).await?;

        match result {
            redis::Value::Nil => Ok(None),
            redis::Value::BulkString(data) => Ok(Some(data)),
            _ => {
                let data: Vec<u8> = redis::from_redis_value(&result)
                    .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                Ok(Some(data))
            }
        }
    }

    /// Blocking pop off the tail of one or more lists, used by the Machinist
    /// worker loop to wait on its priority-ordered queues without busy-polling.
    pub async fn blpop(&mut self, keys: &[String], timeout_secs: u64) -> CacheResult<Option<(String, Vec<u8>)>> {
        let mut cmd = Cmd::new();
        cmd.arg("BRPOP");
        for key in keys {
            cmd.arg(key);
        }
        cmd.arg(timeout_secs);

        let result = self.execute(cmd).await?;

        match result {
            redis::Value::Nil => Ok(None),
            redis::Value::Array(items) if items.len() == 2 => {
                let key: String = redis::from_redis_value(&items[0])
                    .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                let payload: Vec<u8> = redis::from_redis_value(&items[1])
                    .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                Ok(Some((key, payload)))
            }
            _ => Ok(None),
        }
    }

    /// Number of elements in a list
    pub async fn llen(&mut self, key: &str) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("LLEN").arg(key);

        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result)
    }

    /// Inspect a range of list elements without removing them (used by
    /// admin/diagnostic endpoints to preview queue contents)
    pub async fn lrange(&mut self, key: &str, start: i64, stop: i64) -> CacheResult<Vec<Vec<u8>>> {
        let mut cmd = Cmd::new();
        cmd.arg("LRANGE").arg(key).arg(start).arg(stop);

        let result = self.execute(cmd).await?;
        match result {
            redis::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let data: Vec<u8> = redis::from_redis_value(&item)
                        .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                    out.push(data);
                }
                Ok(out)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Add a member to a sorted set with the given score (used for scheduled
    /// jobs and jobgroup polling indices)
    pub async fn zadd(&mut self, key: &str, score: f64, member: &[u8]) -> CacheResult<i64> {
        let mut cmd = Cmd::new();
        cmd.arg("ZADD").arg(key).arg(score).arg(member);

        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result)
    }

    /// Fetch sorted-set members whose score falls within `[min, max]`
    pub async fn zrangebyscore(&mut self, key: &str, min: f64, max: f64) -> CacheResult<Vec<Vec<u8>>> {
        let mut cmd = Cmd::new();
        cmd.arg("ZRANGEBYSCORE").arg(key).arg(min).arg(max);

        let result = self.execute(cmd).await?;
        match result {
            redis::Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let data: Vec<u8> = redis::from_redis_value(&item)
                        .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
                    out.push(data);
                }
                Ok(out)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Remove a member from a sorted set
    pub async fn zrem(&mut self, key: &str, member: &[u8]) -> CacheResult<bool> {
        let mut cmd = Cmd::new();
        cmd.arg("ZREM").arg(key).arg(member);

        let result: i64 = redis::from_redis_value(&self.execute(cmd).await?)
            .map_err(|e| CacheError::OperationError(e.to_string()))?;

        Ok(result > 0)
    }

    /// Set a key only if it does not already exist, with an attached TTL.
    /// Used for the jobgroup-poller distributed lock: `SET key value NX EX ttl`.
    /// Returns `true` if the lock was acquired.
    pub async fn set_nx_ex(&mut self, key: &str, value: &[u8], ttl_secs: u64) -> CacheResult<bool> {
        let mut cmd = Cmd::new();
        cmd.arg("SET").arg(key).arg(value).arg("NX").arg("EX").arg(ttl_secs);

        let result = self.execute(cmd).await?;
        Ok(!matches!(result, redis::Value::Nil))
    }
}

/// Pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    /// Current connection state
    pub state: ConnectionState,
    
    /// Number of active connections
    pub active_connections: usize,
    
    /// Maximum connections allowed
    pub max_connections: usize,
    
    /// Redis URL
    pub url: String,
}

impl PoolStats {
    /// Format as human-readable string
    pub fn format(&self) -> String {
        let state_str = match self.state {
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        
        format!(
            "RedisPool[url={}, state={}, connections={}/{}]",
            self.url, state_str, self.active_connections, self.max_connections
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RedisConfig;
    
    #[tokio::test]
    async fn test_redis_pool_creation() {
        let config = RedisConfig::development();
        let pool = RedisPool::new(config).await;
        
        // This may fail if Redis is not running, which is OK for unit test
        match pool {
            Ok(p) => {
                let stats = p.stats().await;
                assert_eq!(stats.state, ConnectionState::Connected);
            }
            Err(_) => {
                // Redis not available, still a valid test result
                assert!(true);
            }
        }
    }
    
    #[tokio::test]
    async fn test_health_check() {
        let config = RedisConfig::development();
        
        if let Ok(pool) = RedisPool::new(config).await {
            let is_healthy = pool.health_check().await.unwrap();
            assert!(is_healthy);
        }
    }
    
    #[tokio::test]
    async fn test_pool_stats() {
        let config = RedisConfig::development();
        
        if let Ok(pool) = RedisPool::new(config).await {
            let stats = pool.stats().await;
            assert!(stats.url.contains("127.0.0.1"));
            assert!(stats.max_connections > 0);
        }
    }
}