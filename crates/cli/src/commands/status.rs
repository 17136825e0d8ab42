//! Show analyzer health

use crate::client::AnalyzerClient;
use crate::output::{self, OutputFormat};
use anyhow::Result;

/// Fetch and render the analyzer health report
pub async fn show_status(analyzer: &AnalyzerClient, format: OutputFormat) -> Result<()> {
    let report = analyzer.health().await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            println!("analyzer: {}", output::color_status(&report.status));

            let mut names: Vec<&String> = report.components.keys().collect();
            names.sort();
            for name in names {
                let component = &report.components[name];
                match &component.message {
                    Some(message) => println!(
                        "  {:<10} {}  ({message})",
                        name,
                        output::color_status(&component.status)
                    ),
                    None => println!(
                        "  {:<10} {}",
                        name,
                        output::color_status(&component.status)
                    ),
                }
            }

            if report.status != "healthy" {
                output::print_error("Analyzer is not fully healthy");
            }
        }
    }

    Ok(())
}
