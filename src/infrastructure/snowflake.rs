use crate::domain::ports::{GeneratorError, SequenceGenerator};
use async_trait::async_trait;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// 2024-01-01T00:00:00Z in milliseconds.
const EPOCH_MS: i64 = 1_704_067_200_000;
const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER: u16 = (1 << WORKER_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug, Default)]
struct Tick {
    last_ms: i64,
    sequence: i64,
}

/// Time-ordered identifiers: 41 bits of milliseconds, 10 bits of worker id and a
/// 12-bit per-millisecond sequence.
///
/// The key is ignored; identifiers are unique across all keys of one worker. When a
/// millisecond runs out of sequence numbers the generator borrows the next one, so
/// identifiers stay strictly increasing.
pub struct TimeOrderedSequenceGenerator {
    worker_id: u16,
    tick: Mutex<Tick>,
}

impl TimeOrderedSequenceGenerator {
    pub fn new(worker_id: u16) -> Result<Self, GeneratorError> {
        if worker_id > MAX_WORKER {
            return Err(GeneratorError::Rejected(format!(
                "worker id {worker_id} exceeds {MAX_WORKER}"
            )));
        }
        Ok(Self {
            worker_id,
            tick: Mutex::new(Tick::default()),
        })
    }

    fn now_ms() -> Result<i64, GeneratorError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| GeneratorError::Unavailable(format!("clock before unix epoch: {e}")))?;
        Ok(since_epoch.as_millis() as i64 - EPOCH_MS)
    }

    fn compose(&self, ms: i64, sequence: i64) -> i64 {
        (ms << (WORKER_BITS + SEQUENCE_BITS))
            | ((self.worker_id as i64) << SEQUENCE_BITS)
            | sequence
    }
}

#[async_trait]
impl SequenceGenerator for TimeOrderedSequenceGenerator {
    async fn generate(&self, _key: &str, size: usize) -> Result<Vec<i64>, GeneratorError> {
        let mut tick = self.tick.lock().await;
        let now = Self::now_ms()?;
        if now > tick.last_ms {
            tick.last_ms = now;
            tick.sequence = 0;
        } else if tick.last_ms - now > 5_000 {
            return Err(GeneratorError::Rejected(format!(
                "clock moved backwards by {}ms",
                tick.last_ms - now
            )));
        }

        let mut ids = Vec::with_capacity(size);
        for _ in 0..size {
            if tick.sequence > MAX_SEQUENCE {
                tick.last_ms += 1;
                tick.sequence = 0;
            }
            ids.push(self.compose(tick.last_ms, tick.sequence));
            tick.sequence += 1;
        }
        Ok(ids)
    }
}
