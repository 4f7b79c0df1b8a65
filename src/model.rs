use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn generated_id() -> String {
    Uuid::new_v4().to_string()
}

/// The Atomic Unit of moneta
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Unique ID of the transaction (generated when the caller omits it)
    #[serde(default = "generated_id")]
    pub id: String,

    /// Signed amount in the account currency
    pub amount: f64,

    /// Free-form line item text
    pub description: String,

    pub merchant: String,

    pub category: String,

    /// Calendar day the transaction happened on
    pub date: NaiveDate,

    /// Optional place, e.g. "Miami FL"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Transaction {
    /// Canonical sentence handed to the embedding provider.
    ///
    /// Two equal records always render to the same string, so re-ingesting a
    /// record reproduces its vector exactly (given a deterministic provider).
    pub fn to_text(&self) -> String {
        let mut text = format!(
            "Transaction of ${:.2} at {} for {} in category {} on {}",
            self.amount,
            self.merchant,
            self.description,
            self.category,
            self.date.format("%Y-%m-%d"),
        );
        if let Some(location) = &self.location {
            text.push_str(" at ");
            text.push_str(location);
        }
        text
    }
}

/// One retrieval result: the record plus its squared Euclidean distance
/// from the query vector (lower is closer).
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: Transaction,
    pub distance: f32,
}
