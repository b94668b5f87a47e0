use super::next_version;
use crate::domain::order::{ChannelRequest, PayOrder, SubOrder};
use crate::domain::phase::OrderBundle;
use crate::domain::ports::{GeneratorError, OrderRepository, SequenceGenerator};
use crate::error::{BizError, ErrorCode, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct OrderTables {
    pay_orders: BTreeMap<i64, PayOrder>,
    biz_keys: HashMap<String, i64>,
    sub_orders: HashMap<i64, SubOrder>,
    channel_requests: HashMap<i64, ChannelRequest>,
}

/// A thread-safe in-memory order repository.
///
/// All tables sit behind one `RwLock`, which makes the three-record insert atomic
/// and the business-key check race free. Ideal for testing or single-process runs
/// where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryOrderRepository {
    tables: Arc<RwLock<OrderTables>>,
}

impl InMemoryOrderRepository {
    /// Creates a new, empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.pay_orders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert_accepted(&self, orders: &OrderBundle) -> Result<()> {
        let mut tables = self.tables.write().await;
        let pay_order = &orders.pay_order;
        let biz_key = pay_order.biz_key();
        if tables.biz_keys.contains_key(&biz_key)
            || tables.pay_orders.contains_key(&pay_order.pay_order_no)
        {
            return Err(BizError::from(ErrorCode::DuplicateOrder)
                .with_message(format!("order {biz_key} already exists"))
                .into());
        }

        tables.biz_keys.insert(biz_key, pay_order.pay_order_no);
        tables
            .pay_orders
            .insert(pay_order.pay_order_no, pay_order.clone());
        tables
            .sub_orders
            .insert(pay_order.pay_order_no, orders.sub_order.clone());
        tables
            .channel_requests
            .insert(pay_order.pay_order_no, orders.channel_request.clone());
        Ok(())
    }

    async fn find_by_biz_key(&self, biz_key: &str) -> Result<Option<PayOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .biz_keys
            .get(biz_key)
            .and_then(|no| tables.pay_orders.get(no))
            .cloned())
    }

    async fn find_by_pay_order_no(&self, pay_order_no: i64) -> Result<Option<PayOrder>> {
        let tables = self.tables.read().await;
        Ok(tables.pay_orders.get(&pay_order_no).cloned())
    }

    async fn find_sub_order(&self, pay_order_no: i64) -> Result<Option<SubOrder>> {
        let tables = self.tables.read().await;
        Ok(tables.sub_orders.get(&pay_order_no).cloned())
    }

    async fn find_channel_request(&self, pay_order_no: i64) -> Result<Option<ChannelRequest>> {
        let tables = self.tables.read().await;
        Ok(tables.channel_requests.get(&pay_order_no).cloned())
    }

    async fn update_pay_order(&self, order: &PayOrder) -> Result<PayOrder> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .pay_orders
            .get_mut(&order.pay_order_no)
            .ok_or(ErrorCode::OrderNotFound)?;
        let version = next_version("pay order", stored.version, order.version)?;
        *stored = PayOrder {
            version,
            ..order.clone()
        };
        Ok(stored.clone())
    }

    async fn update_sub_order(&self, sub_order: &SubOrder) -> Result<SubOrder> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .sub_orders
            .get_mut(&sub_order.pay_order_no)
            .ok_or(ErrorCode::OrderNotFound)?;
        let version = next_version("sub-order", stored.version, sub_order.version)?;
        *stored = SubOrder {
            version,
            ..sub_order.clone()
        };
        Ok(stored.clone())
    }

    async fn update_channel_request(&self, request: &ChannelRequest) -> Result<ChannelRequest> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .channel_requests
            .get_mut(&request.pay_order_no)
            .ok_or(ErrorCode::OrderNotFound)?;
        let version = next_version("channel request", stored.version, request.version)?;
        *stored = ChannelRequest {
            version,
            ..request.clone()
        };
        Ok(stored.clone())
    }

    async fn find_unfinished(&self, after: i64, limit: usize) -> Result<Vec<PayOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .pay_orders
            .range(after.saturating_add(1)..)
            .map(|(_, order)| order)
            .filter(|order| !order.is_finished())
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Per-key counters starting at a fixed value.
#[derive(Clone)]
pub struct InMemorySequenceGenerator {
    start: i64,
    counters: Arc<Mutex<HashMap<String, i64>>>,
}

impl InMemorySequenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(start: i64) -> Self {
        Self {
            start,
            counters: Arc::default(),
        }
    }
}

impl Default for InMemorySequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SequenceGenerator for InMemorySequenceGenerator {
    async fn generate(
        &self,
        key: &str,
        size: usize,
    ) -> std::result::Result<Vec<i64>, GeneratorError> {
        let mut counters = self.counters.lock().await;
        let next = counters.entry(key.to_string()).or_insert(self.start);
        let first = *next;
        *next += size as i64;
        Ok((first..*next).collect())
    }
}
