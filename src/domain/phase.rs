//! Phase payloads.
//!
//! Every phase has its own request and response shape. They are carried as a tagged
//! union so a single strategy interface can serve all phases, with each strategy
//! matching out the variant it expects.

use super::order::{
    Channel, ChannelOutcome, ChannelRequest, NotifyChannel, PayOrder, PaymentNotification, SubOrder,
};
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use std::fmt;

/// One step of the transaction pipeline, in execution order.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Phase {
    IdGeneration,
    Acceptance,
    Payment,
    Notification,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::IdGeneration,
        Phase::Acceptance,
        Phase::Payment,
        Phase::Notification,
    ];

    pub fn index(&self) -> usize {
        match self {
            Phase::IdGeneration => 0,
            Phase::Acceptance => 1,
            Phase::Payment => 2,
            Phase::Notification => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::IdGeneration => f.write_str("id-generation"),
            Phase::Acceptance => f.write_str("acceptance"),
            Phase::Payment => f.write_str("payment"),
            Phase::Notification => f.write_str("notification"),
        }
    }
}

/// Progress of one phase. Ordered so that a phase can only move forward.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Default)]
pub enum PhaseState {
    #[default]
    NotStarted,
    PreChecked,
    Executed,
    PostChecked,
    Complete,
}

impl PhaseState {
    pub fn is_complete(&self) -> bool {
        *self == PhaseState::Complete
    }
}

/// Strategy discriminator. Each strategy implements exactly one of these.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum StrategyKind {
    Sequence,
    SyncAcceptance,
    Pay(Channel),
    Notify(NotifyChannel),
}

impl StrategyKind {
    pub fn phase(&self) -> Phase {
        match self {
            StrategyKind::Sequence => Phase::IdGeneration,
            StrategyKind::SyncAcceptance => Phase::Acceptance,
            StrategyKind::Pay(_) => Phase::Payment,
            StrategyKind::Notify(_) => Phase::Notification,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Sequence => f.write_str("sequence"),
            StrategyKind::SyncAcceptance => f.write_str("sync-acceptance"),
            StrategyKind::Pay(channel) => write!(f, "pay:{channel}"),
            StrategyKind::Notify(channel) => write!(f, "notify:{channel}"),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct IdGenRequest {
    pub namespace: String,
    pub size: usize,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct IdGenResponse {
    pub ids: Vec<i64>,
}

/// The three records that make up an accepted order.
#[derive(Debug, PartialEq, Clone)]
pub struct OrderBundle {
    pub pay_order: PayOrder,
    pub sub_order: SubOrder,
    pub channel_request: ChannelRequest,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AcceptOutcome {
    Persisted,
    /// Another writer persisted the same business key first.
    Duplicate,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct AcceptResponse {
    pub outcome: Option<AcceptOutcome>,
}

/// The channel's answer together with the records as stored after applying it.
#[derive(Debug, PartialEq, Clone)]
pub struct Settlement {
    pub outcome: ChannelOutcome,
    pub orders: OrderBundle,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct PayResponse {
    pub settlement: Option<Settlement>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct NotifyRequest {
    pub channel: NotifyChannel,
    pub notification: PaymentNotification,
}

#[derive(Debug, PartialEq, Clone, Default)]
pub struct NotifyResponse {
    pub delivered_via: Option<NotifyChannel>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum PhaseRequest {
    IdGeneration(IdGenRequest),
    Acceptance(OrderBundle),
    Payment(OrderBundle),
    Notification(NotifyRequest),
}

#[derive(Debug, PartialEq, Clone)]
pub enum PhaseResponse {
    IdGeneration(IdGenResponse),
    Acceptance(AcceptResponse),
    Payment(PayResponse),
    Notification(NotifyResponse),
}

fn mismatch(expected: Phase, actual: Phase) -> PaymentError {
    BizError::from(ErrorCode::PhaseMismatch)
        .with_message(format!("expected {expected} payload, got {actual}"))
        .into()
}

impl PhaseRequest {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseRequest::IdGeneration(_) => Phase::IdGeneration,
            PhaseRequest::Acceptance(_) => Phase::Acceptance,
            PhaseRequest::Payment(_) => Phase::Payment,
            PhaseRequest::Notification(_) => Phase::Notification,
        }
    }

    pub fn id_generation(&self) -> Result<&IdGenRequest> {
        match self {
            PhaseRequest::IdGeneration(req) => Ok(req),
            other => Err(mismatch(Phase::IdGeneration, other.phase())),
        }
    }

    pub fn acceptance(&self) -> Result<&OrderBundle> {
        match self {
            PhaseRequest::Acceptance(req) => Ok(req),
            other => Err(mismatch(Phase::Acceptance, other.phase())),
        }
    }

    pub fn payment(&self) -> Result<&OrderBundle> {
        match self {
            PhaseRequest::Payment(req) => Ok(req),
            other => Err(mismatch(Phase::Payment, other.phase())),
        }
    }

    pub fn notification(&self) -> Result<&NotifyRequest> {
        match self {
            PhaseRequest::Notification(req) => Ok(req),
            other => Err(mismatch(Phase::Notification, other.phase())),
        }
    }
}

impl PhaseResponse {
    /// The response every phase starts from.
    pub fn empty(phase: Phase) -> Self {
        match phase {
            Phase::IdGeneration => PhaseResponse::IdGeneration(IdGenResponse::default()),
            Phase::Acceptance => PhaseResponse::Acceptance(AcceptResponse::default()),
            Phase::Payment => PhaseResponse::Payment(PayResponse::default()),
            Phase::Notification => PhaseResponse::Notification(NotifyResponse::default()),
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            PhaseResponse::IdGeneration(_) => Phase::IdGeneration,
            PhaseResponse::Acceptance(_) => Phase::Acceptance,
            PhaseResponse::Payment(_) => Phase::Payment,
            PhaseResponse::Notification(_) => Phase::Notification,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty(self.phase())
    }

    pub fn id_generation(&self) -> Result<&IdGenResponse> {
        match self {
            PhaseResponse::IdGeneration(res) => Ok(res),
            other => Err(mismatch(Phase::IdGeneration, other.phase())),
        }
    }

    pub fn id_generation_mut(&mut self) -> Result<&mut IdGenResponse> {
        match self {
            PhaseResponse::IdGeneration(res) => Ok(res),
            other => Err(mismatch(Phase::IdGeneration, other.phase())),
        }
    }

    pub fn acceptance(&self) -> Result<&AcceptResponse> {
        match self {
            PhaseResponse::Acceptance(res) => Ok(res),
            other => Err(mismatch(Phase::Acceptance, other.phase())),
        }
    }

    pub fn acceptance_mut(&mut self) -> Result<&mut AcceptResponse> {
        match self {
            PhaseResponse::Acceptance(res) => Ok(res),
            other => Err(mismatch(Phase::Acceptance, other.phase())),
        }
    }

    pub fn payment(&self) -> Result<&PayResponse> {
        match self {
            PhaseResponse::Payment(res) => Ok(res),
            other => Err(mismatch(Phase::Payment, other.phase())),
        }
    }

    pub fn payment_mut(&mut self) -> Result<&mut PayResponse> {
        match self {
            PhaseResponse::Payment(res) => Ok(res),
            other => Err(mismatch(Phase::Payment, other.phase())),
        }
    }

    pub fn notification(&self) -> Result<&NotifyResponse> {
        match self {
            PhaseResponse::Notification(res) => Ok(res),
            other => Err(mismatch(Phase::Notification, other.phase())),
        }
    }

    pub fn notification_mut(&mut self) -> Result<&mut NotifyResponse> {
        match self {
            PhaseResponse::Notification(res) => Ok(res),
            other => Err(mismatch(Phase::Notification, other.phase())),
        }
    }
}
