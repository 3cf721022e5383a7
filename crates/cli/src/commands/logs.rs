//! `lmgram logs`: Print the JSON request log, newest first.

use std::path::Path;

use lmgram_config::AppConfig;
use serde::Deserialize;

/// The subset of a `tracing-subscriber` JSON line we display.
#[derive(Deserialize)]
struct LogLine {
    timestamp: String,
    level: String,
    #[serde(default)]
    fields: LogFields,
}

#[derive(Deserialize, Default)]
struct LogFields {
    #[serde(default)]
    message: String,
}

pub fn run(config_path: &Path, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::init(config_path)?;
    let log_path = AppConfig::resolve(config_path, &config.paths.log_file);

    let content = match std::fs::read_to_string(&log_path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("No log yet at {}", log_path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for line in render(&content, limit) {
        println!("{line}");
    }
    Ok(())
}

/// Format up to `limit` entries, newest first. Lines that are not JSON log
/// entries are skipped.
fn render(content: &str, limit: usize) -> Vec<String> {
    content
        .lines()
        .rev()
        .filter_map(|line| serde_json::from_str::<LogLine>(line).ok())
        .take(limit)
        .map(|entry| {
            format!(
                "[{}] [{}] {}",
                format_timestamp(&entry.timestamp),
                entry.level,
                entry.fields.message
            )
        })
        .collect()
}

fn format_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}
