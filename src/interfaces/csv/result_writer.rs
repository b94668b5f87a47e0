use crate::domain::command::{Command, OperationType};
use crate::domain::model::TransactionModel;
use crate::domain::order::PayStatus;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row per dispatched command.
#[derive(Debug, Serialize, PartialEq)]
pub struct ResultRecord {
    pub op: OperationType,
    pub biz_key: String,
    pub success: bool,
    pub idempotent: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub pay_order_no: Option<i64>,
    pub status: Option<PayStatus>,
}

impl ResultRecord {
    pub fn new(command: &Command, model: &TransactionModel) -> Self {
        Self {
            op: command.operation(),
            biz_key: command.biz_key(),
            success: model.success,
            idempotent: model.idempotent,
            error_code: model.error_code.clone(),
            error_message: model.error_message.clone(),
            pay_order_no: model.pay_order_no(),
            status: model.pay_order.as_ref().map(|order| order.status),
        }
    }
}

/// Writes command results as CSV, header first.
pub struct ResultWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ResultWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write(&mut self, command: &Command, model: &TransactionModel) -> Result<()> {
        self.writer.serialize(ResultRecord::new(command, model))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
