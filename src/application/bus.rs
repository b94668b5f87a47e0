use crate::domain::command::{Command, OperationType};
use crate::domain::model::TransactionModel;
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, error, info, info_span, warn};

/// Serves exactly one operation type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn operation(&self) -> OperationType;

    async fn handle(&self, command: Command) -> Result<TransactionModel>;
}

pub type CommandHandlerRef = Arc<dyn CommandHandler>;

/// Collects handlers before the bus is frozen.
#[derive(Default)]
pub struct CommandBusBuilder {
    handlers: Vec<CommandHandlerRef>,
}

impl CommandBusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: CommandHandlerRef) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Fails with `ErrorCode::DuplicateHandler` when two handlers claim the same operation.
    pub fn build(self) -> Result<CommandBus> {
        let mut handlers: HashMap<OperationType, CommandHandlerRef> = HashMap::new();
        for handler in self.handlers {
            let operation = handler.operation();
            if handlers.insert(operation, handler).is_some() {
                return Err(BizError::from(ErrorCode::DuplicateHandler)
                    .with_message(format!("more than one handler for {operation}"))
                    .into());
            }
        }
        Ok(CommandBus { handlers })
    }
}

/// Routes each command to the handler of its operation type.
///
/// The handler map is fixed once built, so `send` can be called from many tasks at once.
pub struct CommandBus {
    handlers: HashMap<OperationType, CommandHandlerRef>,
}

impl CommandBus {
    pub fn builder() -> CommandBusBuilder {
        CommandBusBuilder::new()
    }

    pub fn supports(&self, operation: OperationType) -> bool {
        self.handlers.contains_key(&operation)
    }

    /// Dispatches a command and always answers with a model.
    ///
    /// Business failures keep their code and message. Anything else is logged and
    /// reported as `ErrorCode::InvalidOperation`. Commands with a blank header field
    /// never reach a handler.
    pub async fn send(&self, command: Command) -> TransactionModel {
        let operation = command.operation();
        let biz_key = command.biz_key();

        if let Err(err) = command.header().validate() {
            warn!(%operation, %biz_key, message = %err.message, "command rejected");
            return TransactionModel::failed(&err);
        }

        let Some(handler) = self.handlers.get(&operation) else {
            warn!(%operation, %biz_key, "no handler registered for operation");
            return TransactionModel::invalid_operation();
        };

        let span = info_span!("dispatch", %operation, %biz_key);
        async move {
            info!(command = ?command, "command received");
            let started = Instant::now();
            let result = handler.handle(command).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let model = match result {
                Ok(model) => model,
                Err(PaymentError::Business(err)) => {
                    warn!(
                        code = %err.code,
                        message = %err.message,
                        retryable = err.retryable,
                        "command failed"
                    );
                    TransactionModel::failed(&err)
                }
                Err(err) => {
                    error!(error = %err, "command failed unexpectedly");
                    TransactionModel::invalid_operation()
                }
            };
            info!(
                success = model.success,
                idempotent = model.idempotent,
                error_code = ?model.error_code,
                pay_order_no = ?model.pay_order_no(),
                elapsed_ms,
                "command finished"
            );
            model
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::{BizHeader, QueryOrder, RedrivePayment};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        operation: OperationType,
        calls: AtomicUsize,
        answer: fn() -> Result<TransactionModel>,
    }

    impl Scripted {
        fn new(operation: OperationType, answer: fn() -> Result<TransactionModel>) -> Arc<Self> {
            Arc::new(Self {
                operation,
                calls: AtomicUsize::new(0),
                answer,
            })
        }
    }

    #[async_trait]
    impl CommandHandler for Scripted {
        fn operation(&self) -> OperationType {
            self.operation
        }

        async fn handle(&self, _command: Command) -> Result<TransactionModel> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn query() -> Command {
        QueryOrder {
            header: BizHeader::new("SYS", "A1", "U1"),
        }
        .into()
    }

    #[tokio::test]
    async fn test_routes_to_matching_handler_only() {
        let query_handler = Scripted::new(OperationType::Query, || {
            Ok(TransactionModel::succeeded(None))
        });
        let payment_handler =
            Scripted::new(OperationType::Payment, || Ok(TransactionModel::default()));
        let bus = CommandBus::builder()
            .register(query_handler.clone())
            .register(payment_handler.clone())
            .build()
            .unwrap();

        let model = bus.send(query()).await;

        assert!(model.success);
        assert_eq!(query_handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(payment_handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unregistered_operation_falls_back() {
        let bus = CommandBus::builder()
            .register(Scripted::new(OperationType::Query, || Ok(TransactionModel::default())))
            .build()
            .unwrap();

        let redrive: Command = RedrivePayment {
            header: BizHeader::new("SYS", "A1", "U1"),
        }
        .into();
        let model = bus.send(redrive).await;

        assert_eq!(model, TransactionModel::invalid_operation());
    }

    #[tokio::test]
    async fn test_blank_business_key_never_reaches_handler() {
        let handler = Scripted::new(OperationType::Query, || {
            Ok(TransactionModel::succeeded(None))
        });
        let bus = CommandBus::builder()
            .register(handler.clone())
            .build()
            .unwrap();

        let blank: Command = QueryOrder {
            header: BizHeader::new("SYS", "A1", ""),
        }
        .into();
        let model = bus.send(blank).await;

        assert!(!model.success);
        assert_eq!(model.error_code.as_deref(), Some("E0002"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_structured_error_keeps_code() {
        let bus = CommandBus::builder()
            .register(Scripted::new(OperationType::Query, || {
                Err(BizError::new("E9001", "bank offline").into())
            }))
            .build()
            .unwrap();

        let model = bus.send(query()).await;

        assert!(!model.success);
        assert_eq!(model.error_code.as_deref(), Some("E9001"));
        assert_eq!(model.error_message.as_deref(), Some("bank offline"));
    }

    #[tokio::test]
    async fn test_unstructured_error_is_reduced_to_invalid_operation() {
        let bus = CommandBus::builder()
            .register(Scripted::new(OperationType::Query, || {
                Err(PaymentError::internal("disk on fire"))
            }))
            .build()
            .unwrap();

        let model = bus.send(query()).await;

        assert_eq!(model.error_code.as_deref(), Some("E0001"));
        assert_eq!(model.error_message.as_deref(), Some("invalid operation"));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = CommandBus::builder()
            .register(Scripted::new(OperationType::Query, || Ok(TransactionModel::default())))
            .register(Scripted::new(OperationType::Query, || Ok(TransactionModel::default())))
            .build();

        let err = result.err().unwrap();
        assert!(err.as_business().unwrap().is(ErrorCode::DuplicateHandler));
    }
}
