use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A row that can be kept in a live, realtime-synchronized collection.
pub trait Entity: Clone + DeserializeOwned + Send + Sync + 'static {
    /// Table the rows are loaded from and subscribed to.
    const TABLE: &'static str;

    fn id(&self) -> &str;

    /// Status-like field whose transitions are surfaced to the user.
    fn status(&self) -> Option<&str> {
        None
    }

    /// Human-facing label used in notices, e.g. a quote number.
    fn label(&self) -> String {
        self.id().to_string()
    }
}

/// Quote lifecycle. Values written by newer backends are kept in `Other`
/// so one unfamiliar row never fails a whole load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum QuoteStatus {
    Pending,
    Reviewing,
    Quoted,
    Approved,
    Rejected,
    Expired,
    Converted,
    Other(String),
}

impl QuoteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            QuoteStatus::Pending => "pending",
            QuoteStatus::Reviewing => "reviewing",
            QuoteStatus::Quoted => "quoted",
            QuoteStatus::Approved => "approved",
            QuoteStatus::Rejected => "rejected",
            QuoteStatus::Expired => "expired",
            QuoteStatus::Converted => "converted",
            QuoteStatus::Other(other) => other,
        }
    }
}

impl From<String> for QuoteStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "pending" => QuoteStatus::Pending,
            "reviewing" => QuoteStatus::Reviewing,
            "quoted" => QuoteStatus::Quoted,
            "approved" => QuoteStatus::Approved,
            "rejected" => QuoteStatus::Rejected,
            "expired" => QuoteStatus::Expired,
            "converted" => QuoteStatus::Converted,
            _ => QuoteStatus::Other(value),
        }
    }
}

impl From<QuoteStatus> for String {
    fn from(status: QuoteStatus) -> Self {
        match status {
            QuoteStatus::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
    Other(String),
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Other(other) => other,
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "draft" => InvoiceStatus::Draft,
            "sent" => InvoiceStatus::Sent,
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Other(value),
        }
    }
}

impl From<InvoiceStatus> for String {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: String,
    #[serde(default)]
    pub quote_number: Option<String>,
    pub customer_id: Option<String>,
    pub status: QuoteStatus,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Quote {
    const TABLE: &'static str = "quotes";

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }

    fn label(&self) -> String {
        self.quote_number.clone().unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub invoice_number: Option<String>,
    pub customer_id: Option<String>,
    pub status: InvoiceStatus,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub file_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Invoice {
    const TABLE: &'static str = "invoices";

    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> Option<&str> {
        Some(self.status.as_str())
    }

    fn label(&self) -> String {
        self.invoice_number.clone().unwrap_or_else(|| self.id.clone())
    }
}
