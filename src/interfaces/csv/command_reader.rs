use crate::domain::command::{
    AcceptOrder, BizHeader, Command, OperationType, QueryOrder, RedrivePayment,
};
use crate::domain::money::Amount;
use crate::domain::order::{Channel, NotifyChannel};
use crate::error::{BizError, ErrorCode, PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One CSV row. Only acceptance rows use the order columns.
#[derive(Debug, Deserialize)]
pub struct CommandRecord {
    pub op: OperationType,
    pub sys_code: String,
    pub biz_identify_no: String,
    pub biz_unique_no: String,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
    pub channel: Option<Channel>,
    pub notify: Option<NotifyChannel>,
}

fn missing(column: &str, op: OperationType) -> PaymentError {
    BizError::from(ErrorCode::InvalidParameter)
        .with_message(format!("{op} row is missing {column}"))
        .into()
}

impl TryFrom<CommandRecord> for Command {
    type Error = PaymentError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let header = BizHeader::new(
            record.sys_code,
            record.biz_identify_no,
            record.biz_unique_no,
        );
        header.validate()?;
        let op = record.op;
        Ok(match op {
            OperationType::Acceptance => Command::Acceptance(AcceptOrder {
                header,
                amount: Amount::new(record.amount.ok_or_else(|| missing("amount", op))?)?,
                currency: record
                    .currency
                    .filter(|c| !c.is_empty())
                    .ok_or_else(|| missing("currency", op))?,
                channel: record.channel.ok_or_else(|| missing("channel", op))?,
                notify_channel: record.notify.unwrap_or_default(),
            }),
            OperationType::Payment => Command::Payment(RedrivePayment { header }),
            OperationType::Query => Command::Query(QueryOrder { header }),
        })
    }
}

/// Reads commands from a CSV source.
///
/// Wraps `csv::Reader`, trimming whitespace and tolerating short rows, so query
/// and payment rows may leave the order columns out.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes and validates each row.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|row| row.map_err(PaymentError::from).and_then(Command::try_from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str =
        "op, sys_code, biz_identify_no, biz_unique_no, amount, currency, channel, notify";

    #[test]
    fn test_reader_valid_stream() {
        let data = format!(
            "{HEADER}\nacceptance, SYS, A1, U1, 10.50, EUR, bank, log\nquery, SYS, A1, U1\npayment, SYS, A1, U1,,,,"
        );
        let results: Vec<Result<Command>> =
            CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(results.len(), 3);
        match results[0].as_ref().unwrap() {
            Command::Acceptance(order) => {
                assert_eq!(order.amount.value(), dec!(10.50));
                assert_eq!(order.channel, Channel::Bank);
                assert_eq!(order.notify_channel, NotifyChannel::Log);
                assert_eq!(order.header.biz_key(), "A1:U1");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(results[1].as_ref().unwrap().operation(), OperationType::Query);
        assert_eq!(results[2].as_ref().unwrap().operation(), OperationType::Payment);
    }

    #[test]
    fn test_reader_defaults_notify_channel() {
        let data = format!("{HEADER}\nacceptance, SYS, A1, U1, 1, EUR, wallet,");
        let command = CommandReader::new(data.as_bytes()).commands().next().unwrap().unwrap();
        match command {
            Command::Acceptance(order) => assert_eq!(order.notify_channel, NotifyChannel::Publish),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_reader_rejects_incomplete_acceptance() {
        let data = format!(
            "{HEADER}\nacceptance, SYS, A1, U1,, EUR, bank,\nacceptance, SYS, A1, U2, -5, EUR, bank,"
        );
        let results: Vec<Result<Command>> =
            CommandReader::new(data.as_bytes()).commands().collect();
        for result in results {
            let err = result.unwrap_err();
            assert!(err.as_business().unwrap().is(ErrorCode::InvalidParameter));
        }
    }

    #[test]
    fn test_reader_rejects_blank_business_key() {
        let data = format!("{HEADER}\nquery, SYS, A1,\npayment, SYS, , U1");
        let results: Vec<Result<Command>> =
            CommandReader::new(data.as_bytes()).commands().collect();

        assert_eq!(results.len(), 2);
        for result in results {
            let err = result.unwrap_err();
            assert!(err.as_business().unwrap().is(ErrorCode::InvalidParameter));
        }
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = format!("{HEADER}\nrefund, SYS, A1, U1, 1.0, EUR, bank,");
        let results: Vec<Result<Command>> =
            CommandReader::new(data.as_bytes()).commands().collect();

        assert!(matches!(results[0], Err(PaymentError::CsvError(_))));
    }
}
