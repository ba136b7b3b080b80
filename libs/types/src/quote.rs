//! Resolved quote values and their wire encoding
//!
//! A `Quote` is an immutable observation of a price for a stock, produced
//! either by the legacy quote server or replayed out of a cache. On the wire
//! it is one comma-separated line:
//!
//! ```text
//! <stock>,<price>,<user_id>,<timestamp_millis>,<transaction_id>
//! ```
//!
//! The legacy server reports time at millisecond resolution; parsing
//! normalizes that to the canonical second + sub-second representation
//! without losing precision, and serializing converts back.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::WireError;

/// A priced observation of a stock, correlated to the request that asked for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Ticker symbol as reported by the quote server
    pub stock: String,
    /// Fixed-point decimal price, never a binary float
    pub price: Decimal,
    /// Identity of the user the quote server observed the price for
    pub user_id: String,
    /// Point in time the price was observed
    pub timestamp: DateTime<Utc>,
    /// Transaction id of the request this quote answers
    pub transaction_id: u64,
}

impl Quote {
    const FIELD_NAMES: [&'static str; 5] =
        ["stock", "price", "user_id", "timestamp", "transaction_id"];

    /// Parse a quote from its wire line.
    pub fn from_csv(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(WireError::Empty);
        }

        let parts: Vec<&str> = line.split(',').collect();
        let [stock, price, user_id, timestamp, transaction_id] = parts.as_slice() else {
            return Err(field_count_error(&parts, &Self::FIELD_NAMES, line));
        };

        if stock.is_empty() {
            return Err(WireError::MissingField {
                field: "stock",
                payload: line.to_string(),
            });
        }

        let price: Decimal = price
            .parse()
            .map_err(|_| WireError::InvalidPrice(price.to_string()))?;

        let millis: i64 = timestamp
            .parse()
            .map_err(|_| WireError::InvalidTimestamp(timestamp.to_string()))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| WireError::InvalidTimestamp(millis.to_string()))?;

        let transaction_id: u64 = transaction_id
            .parse()
            .map_err(|_| WireError::InvalidTransactionId(transaction_id.to_string()))?;

        Ok(Self {
            stock: stock.to_string(),
            price,
            user_id: user_id.to_string(),
            timestamp,
            transaction_id,
        })
    }

    /// Serialize to the wire line. Timestamps travel as epoch milliseconds.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.stock,
            self.price,
            self.user_id,
            self.timestamp.timestamp_millis(),
            self.transaction_id
        )
    }

    /// Re-stamp this quote with the transaction id of the request it now
    /// answers. A cached payload predates the request that replays it, so
    /// the stored id is meaningless to the new caller.
    pub fn with_transaction_id(self, transaction_id: u64) -> Self {
        Self {
            transaction_id,
            ..self
        }
    }

    /// Whole seconds elapsed between the observation and `now`.
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds()
    }
}

pub(crate) fn field_count_error(
    parts: &[&str],
    field_names: &[&'static str],
    line: &str,
) -> WireError {
    if parts.len() < field_names.len() {
        WireError::MissingField {
            field: field_names[parts.len()],
            payload: line.to_string(),
        }
    } else {
        WireError::TrailingFields(line.to_string())
    }
}
