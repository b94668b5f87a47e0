use super::command::{AcceptOrder, BizHeader, OperationType};
use super::model::TransactionModel;
use super::order::{ChannelRequest, PayOrder, SubOrder};
use super::phase::{OrderBundle, Phase, PhaseRequest, PhaseResponse, PhaseState};
use crate::error::{BizError, ErrorCode, Result};

/// Request, response and progress of a single phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSlot {
    state: PhaseState,
    pub request: Option<PhaseRequest>,
    pub response: PhaseResponse,
}

impl PhaseSlot {
    fn new(phase: Phase) -> Self {
        Self {
            state: PhaseState::NotStarted,
            request: None,
            response: PhaseResponse::empty(phase),
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Moves the phase forward. Requests to move backwards are ignored.
    pub fn advance(&mut self, next: PhaseState) {
        if next > self.state {
            self.state = next;
        }
    }
}

/// Everything one command works on, threaded by value through its pipeline.
///
/// Created per command and dropped once the handler has produced its model.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    operation: OperationType,
    header: BizHeader,
    intake: Option<AcceptOrder>,
    model: TransactionModel,
    complete: bool,
    pay_order: Option<PayOrder>,
    sub_order: Option<SubOrder>,
    channel_request: Option<ChannelRequest>,
    slots: [PhaseSlot; 4],
}

impl TransactionContext {
    pub fn new(operation: OperationType, header: BizHeader) -> Self {
        Self {
            operation,
            header,
            intake: None,
            model: TransactionModel::default(),
            complete: false,
            pay_order: None,
            sub_order: None,
            channel_request: None,
            slots: Phase::ALL.map(PhaseSlot::new),
        }
    }

    /// Context for a brand new order.
    pub fn for_acceptance(order: AcceptOrder) -> Self {
        let mut ctx = Self::new(OperationType::Acceptance, order.header.clone());
        ctx.intake = Some(order);
        ctx
    }

    /// Context for work on an order that is already stored.
    pub fn for_existing(operation: OperationType, orders: OrderBundle) -> Self {
        let mut ctx = Self::new(operation, orders.pay_order.header());
        ctx.load(orders);
        ctx
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn header(&self) -> &BizHeader {
        &self.header
    }

    pub fn biz_key(&self) -> String {
        self.header.biz_key()
    }

    pub fn intake(&self) -> Option<&AcceptOrder> {
        self.intake.as_ref()
    }

    pub fn model(&self) -> &TransactionModel {
        &self.model
    }

    pub fn mark_idempotent(&mut self) {
        self.model.idempotent = true;
    }

    /// Whole-context completion: every remaining phase will skip straight to complete.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
    }

    pub fn slot(&self, phase: Phase) -> &PhaseSlot {
        &self.slots[phase.index()]
    }

    pub fn slot_mut(&mut self, phase: Phase) -> &mut PhaseSlot {
        &mut self.slots[phase.index()]
    }

    pub fn phase_state(&self, phase: Phase) -> PhaseState {
        self.slot(phase).state
    }

    pub fn advance(&mut self, phase: Phase, next: PhaseState) {
        self.slot_mut(phase).advance(next);
    }

    pub fn complete_phase(&mut self, phase: Phase) {
        self.advance(phase, PhaseState::Complete);
    }

    pub fn pay_order(&self) -> Option<&PayOrder> {
        self.pay_order.as_ref()
    }

    pub fn sub_order(&self) -> Option<&SubOrder> {
        self.sub_order.as_ref()
    }

    pub fn channel_request(&self) -> Option<&ChannelRequest> {
        self.channel_request.as_ref()
    }

    /// Replaces the working copies of all three records.
    pub fn load(&mut self, orders: OrderBundle) {
        self.pay_order = Some(orders.pay_order);
        self.sub_order = Some(orders.sub_order);
        self.channel_request = Some(orders.channel_request);
    }

    pub fn set_pay_order(&mut self, order: PayOrder) {
        self.pay_order = Some(order);
    }

    /// The three records as one bundle, failing when id generation has not run yet.
    pub fn orders(&self) -> Result<OrderBundle> {
        match (&self.pay_order, &self.sub_order, &self.channel_request) {
            (Some(pay_order), Some(sub_order), Some(channel_request)) => Ok(OrderBundle {
                pay_order: pay_order.clone(),
                sub_order: sub_order.clone(),
                channel_request: channel_request.clone(),
            }),
            _ => Err(BizError::from(ErrorCode::OrderNotFound)
                .with_message(format!("no order allocated for {}", self.biz_key()))
                .into()),
        }
    }

    /// Produces the successful result of the pipeline.
    pub fn into_model(self) -> TransactionModel {
        let mut model = self.model;
        model.success = true;
        model.pay_order = self.pay_order;
        model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TransactionContext {
        TransactionContext::new(OperationType::Payment, BizHeader::new("SYS", "A1", "U1"))
    }

    #[test]
    fn test_new_context_is_empty() {
        let ctx = ctx();
        assert!(!ctx.is_complete());
        for phase in Phase::ALL {
            let slot = ctx.slot(phase);
            assert_eq!(slot.state(), PhaseState::NotStarted);
            assert!(slot.request.is_none());
            assert!(slot.response.is_empty());
        }
        assert!(ctx.orders().is_err());
    }

    #[test]
    fn test_phase_state_never_regresses() {
        let mut ctx = ctx();
        ctx.complete_phase(Phase::Payment);
        ctx.advance(Phase::Payment, PhaseState::PreChecked);
        assert_eq!(ctx.phase_state(Phase::Payment), PhaseState::Complete);
        assert_eq!(ctx.phase_state(Phase::Notification), PhaseState::NotStarted);
    }

    #[test]
    fn test_into_model_marks_success() {
        let mut ctx = ctx();
        ctx.mark_idempotent();
        let model = ctx.into_model();
        assert!(model.success);
        assert!(model.idempotent);
        assert!(model.pay_order.is_none());
    }
}
