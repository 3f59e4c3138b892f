//! Connection pool for PostgreSQL clients driven by an owned runtime.

use std::ops::Deref;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio_postgres::{Client, NoTls};

use taskvault_core::{StorageErrorKind, TaskResult, TaskStoreError};

/// Fixed-size pool of PostgreSQL clients with RAII checkout.
///
/// The store API is synchronous; every client call goes through the pool's
/// owned current-thread runtime, which also drives the background
/// connection tasks while a call is blocked on it.
pub(crate) struct PostgresPool {
    runtime: Arc<Runtime>,
    available: Arc<Mutex<Vec<Client>>>,
    active: Arc<Mutex<usize>>,
    pool_size: usize,
    url: String,
}

impl PostgresPool {
    pub fn new(url: &str, pool_size: usize) -> TaskResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                TaskStoreError::storage(
                    "postgres runtime",
                    e.to_string(),
                    StorageErrorKind::Connection,
                )
            })?;
        let runtime = Arc::new(runtime);

        let mut available = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            available.push(Self::create_client(&runtime, url)?);
        }

        Ok(Self {
            runtime,
            available: Arc::new(Mutex::new(available)),
            active: Arc::new(Mutex::new(0)),
            pool_size,
            url: url.to_string(),
        })
    }

    fn create_client(runtime: &Arc<Runtime>, url: &str) -> TaskResult<Client> {
        let (client, connection) = runtime
            .block_on(tokio_postgres::connect(url, NoTls))
            .map_err(|e| {
                TaskStoreError::storage(
                    "postgres connect",
                    e.to_string(),
                    StorageErrorKind::Connection,
                )
            })?;

        runtime.spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection task failed");
            }
        });

        Ok(client)
    }

    pub fn runtime(&self) -> Arc<Runtime> {
        Arc::clone(&self.runtime)
    }

    fn lock_error(what: &str) -> TaskStoreError {
        TaskStoreError::storage(
            "postgres pool",
            format!("{what} lock poisoned"),
            StorageErrorKind::Connection,
        )
    }

    /// Check out a client; returned to the pool on drop.
    pub fn acquire(&self) -> TaskResult<PooledClient> {
        {
            let mut available = self.available.lock().map_err(|_| Self::lock_error("pool"))?;
            if let Some(client) = available.pop() {
                let mut active = self.active.lock().map_err(|_| Self::lock_error("counter"))?;
                *active += 1;
                return Ok(PooledClient::new(
                    client,
                    Arc::clone(&self.available),
                    self.pool_size,
                    Arc::clone(&self.active),
                ));
            }
        }

        let mut active = self.active.lock().map_err(|_| Self::lock_error("counter"))?;
        if *active >= self.pool_size {
            return Err(TaskStoreError::storage(
                "postgres pool",
                format!("all {} clients in use", self.pool_size),
                StorageErrorKind::Exhausted,
            ));
        }

        let client = Self::create_client(&self.runtime, &self.url)?;
        *active += 1;

        Ok(PooledClient::new(
            client,
            Arc::clone(&self.available),
            self.pool_size,
            Arc::clone(&self.active),
        ))
    }
}

/// RAII wrapper returning the client to the pool on drop.
pub(crate) struct PooledClient {
    client: Option<Client>,
    pool: Arc<Mutex<Vec<Client>>>,
    pool_size: usize,
    active: Arc<Mutex<usize>>,
}

impl PooledClient {
    fn new(
        client: Client,
        pool: Arc<Mutex<Vec<Client>>>,
        pool_size: usize,
        active: Arc<Mutex<usize>>,
    ) -> Self {
        Self {
            client: Some(client),
            pool,
            pool_size,
            active,
        }
    }
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        self.client
            .as_ref()
            .expect("BUG: PooledClient has no client")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if let (Ok(mut available), Ok(mut active)) = (self.pool.lock(), self.active.lock()) {
                *active = active.saturating_sub(1);
                if available.len() < self.pool_size {
                    available.push(client);
                } else {
                    tracing::warn!(
                        available = available.len(),
                        pool_size = self.pool_size,
                        "pool full when returning postgres client"
                    );
                }
            } else {
                tracing::error!("failed to lock pool for client return; client dropped");
            }
        }
    }
}
