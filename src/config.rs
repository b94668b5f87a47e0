use crate::domain::lock::LockOptions;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Source of pay order numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdGeneratorKind {
    /// Per-namespace counters kept by the storage backend.
    #[default]
    Counter,
    /// Millisecond-ordered identifiers tagged with `worker_id`.
    TimeOrdered,
}

impl FromStr for IdGeneratorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(IdGeneratorKind::Counter),
            "time-ordered" => Ok(IdGeneratorKind::TimeOrdered),
            other => Err(format!("unknown id generator {other}")),
        }
    }
}

/// Runtime settings of the orchestrator.
///
/// Values are layered: defaults, then an optional JSON file, then `PAYFLOW_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Sequence namespace pay order numbers are drawn from.
    pub sequence_namespace: String,
    pub id_max_attempts: u32,
    pub id_retry_initial_delay_ms: u64,
    pub id_retry_max_delay_ms: u64,
    pub id_generator: IdGeneratorKind,
    /// Worker tag of time-ordered identifiers, at most 1023.
    pub worker_id: u16,
    /// Run acceptance and re-drive under a lock named by the business key.
    pub serialize_by_biz_key: bool,
    pub lock_wait_ms: Option<u64>,
    pub lock_lease_ms: Option<u64>,
    pub lock_retries: u32,
    pub redrive_batch_size: usize,
    /// The simulated channels decline anything above this amount.
    pub decline_over: Option<Decimal>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            sequence_namespace: "pay_order_no".to_string(),
            id_max_attempts: 5,
            id_retry_initial_delay_ms: 50,
            id_retry_max_delay_ms: 1_000,
            id_generator: IdGeneratorKind::Counter,
            worker_id: 0,
            serialize_by_biz_key: false,
            lock_wait_ms: Some(3_000),
            lock_lease_ms: Some(30_000),
            lock_retries: 0,
            redrive_batch_size: 100,
            decline_over: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads the file when given, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_overrides(|name| std::env::var(name).ok()))
    }

    /// Applies `PAYFLOW_*` overrides read through `lookup`. Unparsable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(namespace) = lookup("PAYFLOW_SEQUENCE_NAMESPACE")
            && !namespace.trim().is_empty()
        {
            self.sequence_namespace = namespace.trim().to_string();
        }
        if let Some(attempts) = parsed("PAYFLOW_ID_MAX_ATTEMPTS") {
            self.id_max_attempts = attempts as u32;
        }
        if let Some(delay) = parsed("PAYFLOW_ID_RETRY_INITIAL_DELAY_MS") {
            self.id_retry_initial_delay_ms = delay;
        }
        if let Some(delay) = parsed("PAYFLOW_ID_RETRY_MAX_DELAY_MS") {
            self.id_retry_max_delay_ms = delay;
        }
        if let Some(kind) = lookup("PAYFLOW_ID_GENERATOR").and_then(|v| v.parse().ok()) {
            self.id_generator = kind;
        }
        if let Some(worker) =
            lookup("PAYFLOW_WORKER_ID").and_then(|v| v.trim().parse::<u16>().ok())
        {
            self.worker_id = worker;
        }
        if let Some(flag) = lookup("PAYFLOW_SERIALIZE_BY_BIZ_KEY")
            .and_then(|v| v.trim().parse::<bool>().ok())
        {
            self.serialize_by_biz_key = flag;
        }
        if let Some(wait) = parsed("PAYFLOW_LOCK_WAIT_MS") {
            self.lock_wait_ms = Some(wait);
        }
        if let Some(lease) = parsed("PAYFLOW_LOCK_LEASE_MS") {
            self.lock_lease_ms = Some(lease);
        }
        if let Some(retries) = parsed("PAYFLOW_LOCK_RETRIES") {
            self.lock_retries = retries as u32;
        }
        if let Some(size) = parsed("PAYFLOW_REDRIVE_BATCH_SIZE") {
            self.redrive_batch_size = size as usize;
        }
        if let Some(limit) =
            lookup("PAYFLOW_DECLINE_OVER").and_then(|v| v.trim().parse::<Decimal>().ok())
        {
            self.decline_over = Some(limit);
        }
        self
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions {
            wait: self.lock_wait_ms.map(Duration::from_millis),
            lease: self.lock_lease_ms.map(Duration::from_millis),
            retries: self.lock_retries,
        }
    }
}
