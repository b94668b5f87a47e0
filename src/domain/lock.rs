//! Named locks for serializing work on one business key.
//!
//! A lock is held for as long as its [`LockGuard`] lives. Guards are owned values,
//! so a lock taken by one task is not reentrant for that task: acquiring the same
//! name again waits like any other contender.

use crate::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LockMode {
    Exclusive,
    Read,
    Write,
    Multi,
}

/// How to acquire a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockOptions {
    /// How long to wait per attempt. `None` waits until the lock is free.
    pub wait: Option<Duration>,
    /// Force-release the lock after this long, even if the guard is still alive.
    pub lease: Option<Duration>,
    /// Extra attempts after a timed-out wait.
    pub retries: u32,
}

impl LockOptions {
    pub fn waiting(wait: Duration) -> Self {
        Self {
            wait: Some(wait),
            ..Self::default()
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// Proof of holding a named lock. Dropping it releases the lock.
pub struct LockGuard {
    name: String,
    mode: LockMode,
    _held: Box<dyn Send + Sync>,
}

impl LockGuard {
    pub fn new(name: impl Into<String>, mode: LockMode, held: impl Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            mode,
            _held: Box::new(held),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn release(self) {
        debug!(lock = %self.name, "lock released");
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .finish()
    }
}

#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquires an exclusive lock, failing with `ErrorCode::LockNotAcquired` when a
    /// bounded wait runs out.
    async fn lock(&self, name: &str, options: LockOptions) -> Result<LockGuard>;
    /// Like [`LockManager::lock`] but reports contention as `Ok(None)`. A missing
    /// `wait` means a single non-blocking attempt.
    async fn try_lock(&self, name: &str, options: LockOptions) -> Result<Option<LockGuard>>;
    async fn read_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard>;
    async fn write_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard>;
    /// Acquires every name or none of them.
    async fn multi_lock(&self, names: &[String], options: LockOptions) -> Result<LockGuard>;
    async fn init(&self) -> Result<()>;
    /// Drops all lock state. Later acquisitions fail with `ErrorCode::LockUnavailable`.
    async fn destroy(&self) -> Result<()>;
}

pub type LockManagerRef = Arc<dyn LockManager>;

/// Runs `work` while holding the exclusive lock `name`.
pub async fn with_lock<F, T>(
    manager: &dyn LockManager,
    name: &str,
    options: LockOptions,
    work: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let guard = manager.lock(name, options).await?;
    let output = work.await;
    guard.release();
    output
}

/// Runs `work` under the lock `name`, or `fallback` when the lock is contended.
pub async fn try_with_lock<F, G, T>(
    manager: &dyn LockManager,
    name: &str,
    options: LockOptions,
    work: F,
    fallback: G,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
    G: Future<Output = Result<T>>,
{
    match manager.try_lock(name, options).await? {
        Some(guard) => {
            let output = work.await;
            guard.release();
            output
        }
        None => {
            debug!(lock = %name, "lock contended, running fallback");
            fallback.await
        }
    }
}
