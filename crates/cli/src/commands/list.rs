//! List recent threat verdicts from the threat index

use crate::client::{StoreClient, ThreatDoc};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

/// Row shape for the verdict table
#[derive(Tabled, Serialize)]
struct ThreatRow {
    #[tabled(rename = "TIME")]
    time: String,
    #[tabled(rename = "THREAT")]
    threat: String,
    #[tabled(rename = "CONF")]
    confidence: String,
    #[tabled(rename = "SOURCE")]
    source: String,
    #[tabled(rename = "LOG")]
    log: String,
    #[tabled(rename = "RECOMMENDATION")]
    recommendation: String,
}

impl From<&ThreatDoc> for ThreatRow {
    fn from(doc: &ThreatDoc) -> Self {
        Self {
            time: doc.timestamp.clone(),
            threat: output::color_threat(&doc.threat),
            confidence: output::format_confidence(doc.confidence),
            source: doc.source.clone(),
            log: output::truncate_log(&doc.log, 60),
            recommendation: output::truncate_log(&doc.recommendation, 40),
        }
    }
}

/// Fetch and render the newest verdicts
pub async fn list_threats(
    store: &StoreClient,
    index: &str,
    limit: usize,
    threat: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let threats = store.list_threats(index, limit, threat).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&threats)?);
        }
        OutputFormat::Table => {
            if threats.is_empty() {
                output::print_info("No threat verdicts found");
                return Ok(());
            }
            let rows: Vec<ThreatRow> = threats.iter().map(ThreatRow::from).collect();
            output::print_table(&rows, format);
        }
    }

    Ok(())
}
