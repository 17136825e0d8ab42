//! Core data models for the threat analyzer

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Threat classification labels the model is instructed to choose from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLabel {
    None,
    Malware,
    Phishing,
    BruteForce,
    Sqli,
    Xss,
}

impl ThreatLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLabel::None => "none",
            ThreatLabel::Malware => "malware",
            ThreatLabel::Phishing => "phishing",
            ThreatLabel::BruteForce => "brute_force",
            ThreatLabel::Sqli => "sqli",
            ThreatLabel::Xss => "xss",
        }
    }

    /// True when the verdict flags something worth acting on
    pub fn is_threat(&self) -> bool {
        !matches!(self, ThreatLabel::None)
    }
}

impl std::fmt::Display for ThreatLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated classification produced by the inference service for one log line
///
/// All four fields are required; a completion missing any of them is a parse
/// failure, never a partial verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatVerdict {
    pub threat: ThreatLabel,
    pub confidence: u8,
    pub evidence: Value,
    pub recommendation: String,
}

/// A log document selected from the log index
///
/// Holds enough addressing information (`index`, `id`) to claim the source
/// record after selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Index the document lives in
    pub index: String,
    /// Store-assigned document id
    pub id: String,
    /// Raw `_source` body
    pub source: Value,
}

impl LogRecord {
    /// Extract the log line, trying the known message field locations
    ///
    /// Filebeat-style documents carry the text at `message`; some shippers
    /// nest it under `log.message` instead.
    pub fn message(&self) -> Option<&str> {
        self.source
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| {
                self.source
                    .get("log")
                    .and_then(|log| log.get("message"))
                    .and_then(Value::as_str)
            })
    }

    /// Timestamp the log was produced at, as stored in `@timestamp`
    pub fn timestamp(&self) -> Option<&str> {
        self.source.get("@timestamp").and_then(Value::as_str)
    }
}

/// Document persisted to the threat index for one analyzed log line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub log: String,
    pub source: String,
    pub threat: ThreatLabel,
    pub confidence: u8,
    pub evidence: Value,
    pub recommendation: String,
}

impl ThreatDocument {
    /// Merge the original log context with a verdict
    pub fn from_parts(timestamp: &str, log: &str, source_tag: &str, verdict: ThreatVerdict) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            log: log.to_string(),
            source: source_tag.to_string(),
            threat: verdict.threat,
            confidence: verdict.confidence,
            evidence: verdict.evidence,
            recommendation: verdict.recommendation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_threat_label_serde_round_trip() {
        let json = serde_json::to_string(&ThreatLabel::BruteForce).unwrap();
        assert_eq!(json, "\"brute_force\"");

        let label: ThreatLabel = serde_json::from_str("\"sqli\"").unwrap();
        assert_eq!(label, ThreatLabel::Sqli);
    }

    #[test]
    fn test_threat_label_rejects_unknown() {
        let result: Result<ThreatLabel, _> = serde_json::from_str("\"ransomware\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_message_top_level_field() {
        let record = LogRecord {
            index: "logs-2026.08".to_string(),
            id: "abc".to_string(),
            source: json!({"@timestamp": "2026-08-30T10:00:00Z", "message": "GET / 200"}),
        };
        assert_eq!(record.message(), Some("GET / 200"));
    }

    #[test]
    fn test_message_nested_under_log() {
        let record = LogRecord {
            index: "logs-2026.08".to_string(),
            id: "abc".to_string(),
            source: json!({"log": {"message": "POST /login 401"}}),
        };
        assert_eq!(record.message(), Some("POST /login 401"));
    }

    #[test]
    fn test_message_absent() {
        let record = LogRecord {
            index: "logs-2026.08".to_string(),
            id: "abc".to_string(),
            source: json!({"@timestamp": "2026-08-30T10:00:00Z"}),
        };
        assert_eq!(record.message(), None);
    }

    #[test]
    fn test_threat_document_field_names() {
        let doc = ThreatDocument::from_parts(
            "2026-08-30T10:00:00Z",
            "GET /admin HTTP/1.1 401",
            "nginx",
            ThreatVerdict {
                threat: ThreatLabel::BruteForce,
                confidence: 70,
                evidence: json!({"path": "/admin"}),
                recommendation: "rate-limit".to_string(),
            },
        );

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["@timestamp"], "2026-08-30T10:00:00Z");
        assert_eq!(value["log"], "GET /admin HTTP/1.1 401");
        assert_eq!(value["source"], "nginx");
        assert_eq!(value["threat"], "brute_force");
        assert_eq!(value["confidence"], 70);
        assert_eq!(value["evidence"]["path"], "/admin");
        assert_eq!(value["recommendation"], "rate-limit");
    }
}
