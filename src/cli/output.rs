//! CLI output formatting

use crate::{
    core::{config::OutputFormat, Pipeline},
    execution::UploadEvent,
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Format an upload event for display
pub fn format_upload_event(event: &UploadEvent) -> String {
    match event {
        UploadEvent::DocumentParsed { document, steps } => format!(
            "{} Parsed document {} ({} steps)",
            INFO,
            style(document).bold(),
            style(steps).cyan()
        ),
        UploadEvent::StepsFiltered { document, skipped } => {
            if *skipped == 0 {
                format!("{} Document {}: no steps skipped", INFO, style(document).bold())
            } else {
                format!(
                    "{} Document {}: {} skipped by if_changed",
                    INFO,
                    style(document).bold(),
                    style(skipped).yellow()
                )
            }
        }
        UploadEvent::UploadStarted { document, filename } => format!(
            "{} Uploading document {} from {}",
            SPINNER,
            style(document).bold(),
            style(filename).dim()
        ),
        UploadEvent::UploadCompleted { document, receipt } => {
            let attempts = if receipt.attempts > 1 {
                format!(" after {} attempts", receipt.attempts)
            } else {
                String::new()
            };
            format!(
                "{} Uploaded document {} ({}){}",
                CHECK,
                style(document).bold(),
                style(&receipt.uuid.to_string()[..8]).dim(),
                attempts
            )
        }
    }
}

/// Render processed pipelines for a dry run.
///
/// JSON output is always one value: the pipeline itself, or an array when the
/// input held several documents.
pub fn format_pipelines(pipelines: &[Pipeline], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => match pipelines {
            [single] => Ok(serde_json::to_string_pretty(single)?),
            many => Ok(serde_json::to_string_pretty(many)?),
        },
        OutputFormat::Yaml => {
            let rendered = pipelines
                .iter()
                .map(Pipeline::to_yaml)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rendered.join("---\n"))
        }
    }
}
