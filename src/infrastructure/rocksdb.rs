use super::next_version;
use crate::domain::order::{ChannelRequest, PayOrder, SubOrder};
use crate::domain::phase::OrderBundle;
use crate::domain::ports::{GeneratorError, OrderRepository, SequenceGenerator};
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for pay orders, keyed by pay order number.
pub const CF_PAY_ORDERS: &str = "pay_orders";
/// Column Family for sub-orders, keyed by their parent pay order number.
pub const CF_SUB_ORDERS: &str = "sub_orders";
/// Column Family for channel requests, keyed by their parent pay order number.
pub const CF_CHANNEL_REQUESTS: &str = "channel_requests";
/// Column Family mapping business keys to pay order numbers.
pub const CF_BIZ_KEYS: &str = "biz_keys";
/// Column Family holding the next value of each sequence.
pub const CF_SEQUENCES: &str = "sequences";

/// A persistent order store using RocksDB.
///
/// Each record type lives in its own Column Family. Reads go straight to the
/// database; writes are serialized through one mutex so that the business-key check,
/// the version check and the write itself happen as one step.
///
/// The store doubles as a durable [`SequenceGenerator`], so identifiers keep
/// increasing across restarts.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writes: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let families = [
            CF_PAY_ORDERS,
            CF_SUB_ORDERS,
            CF_CHANNEL_REQUESTS,
            CF_BIZ_KEYS,
            CF_SEQUENCES,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, families)?;

        Ok(Self {
            db: Arc::new(db),
            writes: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::internal(format!("column family {name} not found")))
    }

    fn get<T: DeserializeOwned>(&self, family: &str, key: impl AsRef<[u8]>) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(family)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, family: &str, key: impl AsRef<[u8]>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(family)?, key, bytes)?;
        Ok(())
    }

    fn next_sequence(&self, key: &str, size: usize) -> Result<Vec<i64>> {
        let family = self.cf(CF_SEQUENCES)?;
        let first = match self.db.get_pinned_cf(family, key)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_ref()
                    .try_into()
                    .map_err(|_| PaymentError::internal(format!("corrupt sequence {key}")))?;
                i64::from_be_bytes(raw)
            }
            None => 1,
        };
        let next = first + size as i64;
        self.db.put_cf(family, key, next.to_be_bytes())?;
        Ok((first..next).collect())
    }
}

#[async_trait]
impl OrderRepository for RocksDBStore {
    async fn insert_accepted(&self, orders: &OrderBundle) -> Result<()> {
        let _writing = self.writes.lock().await;
        let pay_order = &orders.pay_order;
        let key = pay_order.pay_order_no.to_be_bytes();
        let biz_key = pay_order.biz_key();

        let biz_keys = self.cf(CF_BIZ_KEYS)?;
        let pay_orders = self.cf(CF_PAY_ORDERS)?;
        if self.db.get_pinned_cf(biz_keys, &biz_key)?.is_some()
            || self.db.get_pinned_cf(pay_orders, key)?.is_some()
        {
            return Err(BizError::from(ErrorCode::DuplicateOrder)
                .with_message(format!("order {biz_key} already exists"))
                .into());
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(biz_keys, &biz_key, key);
        batch.put_cf(pay_orders, key, serde_json::to_vec(pay_order)?);
        batch.put_cf(
            self.cf(CF_SUB_ORDERS)?,
            key,
            serde_json::to_vec(&orders.sub_order)?,
        );
        batch.put_cf(
            self.cf(CF_CHANNEL_REQUESTS)?,
            key,
            serde_json::to_vec(&orders.channel_request)?,
        );
        self.db.write(batch)?;
        Ok(())
    }

    async fn find_by_biz_key(&self, biz_key: &str) -> Result<Option<PayOrder>> {
        let Some(bytes) = self.db.get_pinned_cf(self.cf(CF_BIZ_KEYS)?, biz_key)? else {
            return Ok(None);
        };
        let raw: [u8; 8] = bytes
            .as_ref()
            .try_into()
            .map_err(|_| PaymentError::internal(format!("corrupt index entry for {biz_key}")))?;
        self.get(CF_PAY_ORDERS, raw)
    }

    async fn find_by_pay_order_no(&self, pay_order_no: i64) -> Result<Option<PayOrder>> {
        self.get(CF_PAY_ORDERS, pay_order_no.to_be_bytes())
    }

    async fn find_sub_order(&self, pay_order_no: i64) -> Result<Option<SubOrder>> {
        self.get(CF_SUB_ORDERS, pay_order_no.to_be_bytes())
    }

    async fn find_channel_request(&self, pay_order_no: i64) -> Result<Option<ChannelRequest>> {
        self.get(CF_CHANNEL_REQUESTS, pay_order_no.to_be_bytes())
    }

    async fn update_pay_order(&self, order: &PayOrder) -> Result<PayOrder> {
        let _writing = self.writes.lock().await;
        let key = order.pay_order_no.to_be_bytes();
        let stored: PayOrder = self
            .get(CF_PAY_ORDERS, key)?
            .ok_or(ErrorCode::OrderNotFound)?;
        let updated = PayOrder {
            version: next_version("pay order", stored.version, order.version)?,
            ..order.clone()
        };
        self.put(CF_PAY_ORDERS, key, &updated)?;
        Ok(updated)
    }

    async fn update_sub_order(&self, sub_order: &SubOrder) -> Result<SubOrder> {
        let _writing = self.writes.lock().await;
        let key = sub_order.pay_order_no.to_be_bytes();
        let stored: SubOrder = self
            .get(CF_SUB_ORDERS, key)?
            .ok_or(ErrorCode::OrderNotFound)?;
        let updated = SubOrder {
            version: next_version("sub-order", stored.version, sub_order.version)?,
            ..sub_order.clone()
        };
        self.put(CF_SUB_ORDERS, key, &updated)?;
        Ok(updated)
    }

    async fn update_channel_request(&self, request: &ChannelRequest) -> Result<ChannelRequest> {
        let _writing = self.writes.lock().await;
        let key = request.pay_order_no.to_be_bytes();
        let stored: ChannelRequest = self
            .get(CF_CHANNEL_REQUESTS, key)?
            .ok_or(ErrorCode::OrderNotFound)?;
        let updated = ChannelRequest {
            version: next_version("channel request", stored.version, request.version)?,
            ..request.clone()
        };
        self.put(CF_CHANNEL_REQUESTS, key, &updated)?;
        Ok(updated)
    }

    async fn find_unfinished(&self, after: i64, limit: usize) -> Result<Vec<PayOrder>> {
        let mut unfinished = Vec::new();
        // Big-endian keys of positive numbers iterate in numeric order.
        let start = after.saturating_add(1).max(0).to_be_bytes();
        let mode = IteratorMode::From(&start, Direction::Forward);
        for item in self.db.iterator_cf(self.cf(CF_PAY_ORDERS)?, mode) {
            if unfinished.len() == limit {
                break;
            }
            let (_key, value) = item?;
            let order: PayOrder = serde_json::from_slice(&value)?;
            if !order.is_finished() {
                unfinished.push(order);
            }
        }
        Ok(unfinished)
    }
}

#[async_trait]
impl SequenceGenerator for RocksDBStore {
    async fn generate(
        &self,
        key: &str,
        size: usize,
    ) -> std::result::Result<Vec<i64>, GeneratorError> {
        let _writing = self.writes.lock().await;
        self.next_sequence(key, size)
            .map_err(|e| GeneratorError::Unavailable(e.to_string()))
    }
}
