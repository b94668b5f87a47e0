use crate::domain::lock::{LockGuard, LockManager, LockManagerRef, LockMode, LockOptions};
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::warn;

type Held = Box<dyn Send + Sync>;
type Registry = Arc<Mutex<HashMap<String, Arc<RwLock<()>>>>>;

/// Interest of one waiter or holder in a named lock.
///
/// The name leaves the registry when its last claim drops.
struct Claim {
    name: String,
    lock: Option<Arc<RwLock<()>>>,
    registry: Registry,
}

impl Claim {
    fn lock(&self) -> Arc<RwLock<()>> {
        self.lock.clone().unwrap_or_default()
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        drop(self.lock.take());
        if let Ok(mut locks) = self.registry.lock()
            && locks
                .get(&self.name)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.name);
        }
    }
}

/// Holds a lock for at most `lease`, releasing it early if the guard drops first.
struct Leased {
    held: Arc<std::sync::Mutex<Option<Held>>>,
    expiry: JoinHandle<()>,
}

impl Leased {
    fn new(name: String, held: Held, lease: Duration) -> Self {
        let held = Arc::new(std::sync::Mutex::new(Some(held)));
        let slot = Arc::clone(&held);
        let expiry = tokio::spawn(async move {
            tokio::time::sleep(lease).await;
            let expired = slot.lock().map(|mut s| s.take()).unwrap_or_default();
            if expired.is_some() {
                warn!(
                    lock = %name,
                    lease_ms = lease.as_millis() as u64,
                    "lock lease expired, releasing"
                );
            }
        });
        Self { held, expiry }
    }
}

impl Drop for Leased {
    fn drop(&mut self) {
        self.expiry.abort();
        if let Ok(mut held) = self.held.lock() {
            held.take();
        }
    }
}

fn not_acquired(name: &str) -> PaymentError {
    BizError::from(ErrorCode::LockNotAcquired)
        .with_message(format!("lock {name} is held elsewhere"))
        .into()
}

/// Waits for `acquire` according to `options`; `None` when every attempt timed out.
async fn acquire_with<F, Fut, G>(options: &LockOptions, acquire: F) -> Option<G>
where
    F: Fn() -> Fut,
    Fut: Future<Output = G>,
{
    match options.wait {
        None => Some(acquire().await),
        Some(wait) => {
            for _ in 0..=options.retries {
                if let Ok(guard) = timeout(wait, acquire()).await {
                    return Some(guard);
                }
            }
            None
        }
    }
}

/// Process-local named locks backed by `tokio::sync::RwLock`.
///
/// Exclusive and write locks share the same underlying lock, so a write lock on a
/// name also excludes exclusive holders of that name. Names nobody holds or waits
/// for are forgotten.
pub struct LocalLockManager {
    locks: Registry,
    active: AtomicBool,
}

impl Default for LocalLockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLockManager {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            active: AtomicBool::new(true),
        }
    }

    /// Number of names currently held or waited for.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn claim(&self, name: &str) -> Result<Claim> {
        if !self.active.load(Ordering::SeqCst) {
            return Err(BizError::from(ErrorCode::LockUnavailable)
                .with_message("lock manager has been destroyed")
                .into());
        }
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| PaymentError::internal("lock registry poisoned"))?;
        let lock = Arc::clone(locks.entry(name.to_string()).or_default());
        Ok(Claim {
            name: name.to_string(),
            lock: Some(lock),
            registry: Arc::clone(&self.locks),
        })
    }

    fn guard(name: &str, mode: LockMode, held: Held, options: &LockOptions) -> LockGuard {
        match options.lease {
            Some(lease) => LockGuard::new(name, mode, Leased::new(name.to_string(), held, lease)),
            None => LockGuard::new(name, mode, held),
        }
    }

    // The guard is the first tuple field so it is released before the claim.
    async fn acquire_write(&self, name: &str, options: &LockOptions) -> Result<Option<Held>> {
        let claim = self.claim(name)?;
        let held = acquire_with(options, || claim.lock().write_owned()).await;
        Ok(held.map(|g| Box::new((g, claim)) as Held))
    }

    async fn acquire_read(&self, name: &str, options: &LockOptions) -> Result<Option<Held>> {
        let claim = self.claim(name)?;
        let held = acquire_with(options, || claim.lock().read_owned()).await;
        Ok(held.map(|g| Box::new((g, claim)) as Held))
    }

    async fn write_mode(
        &self,
        name: &str,
        mode: LockMode,
        options: LockOptions,
    ) -> Result<LockGuard> {
        match self.acquire_write(name, &options).await? {
            Some(held) => Ok(Self::guard(name, mode, held, &options)),
            None => Err(not_acquired(name)),
        }
    }
}

#[async_trait]
impl LockManager for LocalLockManager {
    async fn lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        self.write_mode(name, LockMode::Exclusive, options).await
    }

    async fn try_lock(&self, name: &str, options: LockOptions) -> Result<Option<LockGuard>> {
        let held: Option<Held> = match options.wait {
            None => {
                let claim = self.claim(name)?;
                claim
                    .lock()
                    .try_write_owned()
                    .ok()
                    .map(|g| Box::new((g, claim)) as Held)
            }
            Some(_) => self.acquire_write(name, &options).await?,
        };
        Ok(held.map(|held| Self::guard(name, LockMode::Exclusive, held, &options)))
    }

    async fn read_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        match self.acquire_read(name, &options).await? {
            Some(held) => Ok(Self::guard(name, LockMode::Read, held, &options)),
            None => Err(not_acquired(name)),
        }
    }

    async fn write_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        self.write_mode(name, LockMode::Write, options).await
    }

    async fn multi_lock(&self, names: &[String], options: LockOptions) -> Result<LockGuard> {
        // A fixed acquisition order keeps two multi-locks from deadlocking.
        let mut ordered: Vec<&String> = names.iter().collect();
        ordered.sort();
        ordered.dedup();

        let mut held = Vec::with_capacity(ordered.len());
        for name in &ordered {
            match self.acquire_write(name, &options).await? {
                Some(guard) => held.push(guard),
                // Locks taken so far are released when `held` drops.
                None => return Err(not_acquired(name)),
            }
        }
        let label = ordered
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(",");
        Ok(Self::guard(&label, LockMode::Multi, Box::new(held), &options))
    }

    async fn init(&self) -> Result<()> {
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        self.active.store(false, Ordering::SeqCst);
        if let Ok(mut locks) = self.locks.lock() {
            locks.clear();
        }
        Ok(())
    }
}

/// Delegates to one of several named lock engines, switchable at runtime.
pub struct SwitchableLockManager {
    engines: HashMap<String, LockManagerRef>,
    active: RwLock<String>,
}

impl SwitchableLockManager {
    pub fn new(name: impl Into<String>, engine: LockManagerRef) -> Self {
        let name = name.into();
        Self {
            engines: HashMap::from([(name.clone(), engine)]),
            active: RwLock::new(name),
        }
    }

    pub fn with_engine(mut self, name: impl Into<String>, engine: LockManagerRef) -> Self {
        self.engines.insert(name.into(), engine);
        self
    }

    pub async fn active_engine(&self) -> String {
        self.active.read().await.clone()
    }

    /// Routes later acquisitions to `name`. Locks already held stay with their engine.
    pub async fn switch_engine(&self, name: &str) -> Result<()> {
        if !self.engines.contains_key(name) {
            return Err(BizError::from(ErrorCode::InvalidParameter)
                .with_message(format!("unknown lock engine {name}"))
                .into());
        }
        *self.active.write().await = name.to_string();
        Ok(())
    }

    async fn current(&self) -> Result<LockManagerRef> {
        let active = self.active.read().await;
        self.engines
            .get(active.as_str())
            .cloned()
            .ok_or_else(|| ErrorCode::LockUnavailable.into())
    }
}

#[async_trait]
impl LockManager for SwitchableLockManager {
    async fn lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        self.current().await?.lock(name, options).await
    }

    async fn try_lock(&self, name: &str, options: LockOptions) -> Result<Option<LockGuard>> {
        self.current().await?.try_lock(name, options).await
    }

    async fn read_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        self.current().await?.read_lock(name, options).await
    }

    async fn write_lock(&self, name: &str, options: LockOptions) -> Result<LockGuard> {
        self.current().await?.write_lock(name, options).await
    }

    async fn multi_lock(&self, names: &[String], options: LockOptions) -> Result<LockGuard> {
        self.current().await?.multi_lock(names, options).await
    }

    async fn init(&self) -> Result<()> {
        for engine in self.engines.values() {
            engine.init().await?;
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        for engine in self.engines.values() {
            engine.destroy().await?;
        }
        Ok(())
    }
}
