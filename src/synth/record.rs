use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One synthetic observability event, shaped the way the document store indexes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "service.name")]
    pub service: String,

    #[serde(rename = "http.status_code")]
    pub status_code: u16,

    pub latency_ms: f64,

    #[serde(rename = "log.message")]
    pub message: String,

    #[serde(rename = "trace.id")]
    pub trace_id: String,

    #[serde(rename = "span.id")]
    pub span_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anomaly: bool,
}

impl Record {
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: f64,
    pub status: TransactionStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Payment,
    Checkout,
    Order,
}

impl TransactionKind {
    pub const ALL: [TransactionKind; 3] = [
        TransactionKind::Payment,
        TransactionKind::Checkout,
        TransactionKind::Order,
    ];

    /// Uniform amount range for this transaction type, before any incident reduction.
    pub fn amount_range(self) -> (f64, f64) {
        match self {
            TransactionKind::Payment => (50.0, 500.0),
            TransactionKind::Checkout => (25.0, 350.0),
            TransactionKind::Order => (10.0, 200.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Success,
    Failed,
    Cancelled,
}

/// Round to two decimals, the precision records are stored with.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Record {
        Record {
            timestamp: "2025-12-15T10:00:00Z".parse().unwrap(),
            service: "payment-service".to_string(),
            status_code: 201,
            latency_ms: 212.5,
            message: "Payment processed".to_string(),
            trace_id: "trace-123456".to_string(),
            span_id: "span-654321".to_string(),
            transaction: Some(Transaction {
                kind: TransactionKind::Checkout,
                amount: 99.99,
                status: TransactionStatus::Success,
            }),
            anomaly: false,
        }
    }

    #[test]
    fn test_document_uses_dotted_keys() {
        let value: serde_json::Value =
            serde_json::from_str(&sample().to_json_line().unwrap()).unwrap();
        assert_eq!(value["service.name"], "payment-service");
        assert_eq!(value["http.status_code"], 201);
        assert_eq!(value["transaction"]["type"], "checkout");
        assert_eq!(value["transaction"]["status"], "success");
        assert!(value.get("@timestamp").is_some());
        // Healthy records carry no anomaly tag at all.
        assert!(value.get("anomaly").is_none());
    }

    #[test]
    fn test_anomaly_tag_only_when_set() {
        let mut record = sample();
        record.transaction = None;
        record.anomaly = true;
        let line = record.to_json_line().unwrap();
        assert!(line.contains("\"anomaly\":true"));
        assert!(!line.contains("transaction"));
        assert_eq!(Record::from_json_line(&line).unwrap(), record);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.3456), 12.35);
        assert_eq!(round2(3.0), 3.0);
    }
}
