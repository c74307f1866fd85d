use std::io::{self, Write};

use serde::Serialize;

use crate::app::{FetchResult, ProgressEvent, ProgressSink};
use crate::domain::SPECIES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Plain progress lines on stderr, for pipes and batch wrappers.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        if let Some(line) = console_line(&event.message) {
            eprintln!("{line}");
        }
    }
}

fn console_line(message: &str) -> Option<String> {
    let message = message.trim();
    if message.starts_with("biomart.") {
        return None;
    }
    if let Some(rest) = message.strip_prefix("phase=") {
        let (phase, payload) = rest.split_once(';').unwrap_or((rest, ""));
        let payload = payload.trim();
        let icon = match phase {
            "Resolve" => "🔍",
            "Failed" => "❌",
            "Done" => "✅",
            _ => "•",
        };
        return Some(format!("{icon} {payload}"));
    }
    if message.starts_with("retry") {
        return Some(format!("🔄 {message}"));
    }
    if message.starts_with("fallback") {
        return Some(format!("⚠️ {message}"));
    }
    Some(message.to_string())
}

pub fn print_fetch_summary(result: &FetchResult) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!(
        "{green}✅ Saved annotations to {} ({} genes){reset}",
        result.output_path, result.rows
    );
    println!(
        "{cyan}   dataset: {} ({}) on {}{reset}",
        result.dataset_id, result.mart, result.server_url
    );
    if let Some(reason) = &result.fallback_reason {
        println!("{yellow}⚠️ without UniProt ID: {reason}{reset}");
    }
}

pub fn print_species_list() {
    for entry in SPECIES {
        println!(
            "{:<26} {:<28} {}",
            entry.species_key, entry.dataset_id, entry.server
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_hides_wire_events() {
        assert_eq!(console_line("biomart.request query"), None);
        assert_eq!(
            console_line("phase=Done; saved 3 genes"),
            Some("✅ saved 3 genes".to_string())
        );
        assert!(console_line("retry attempt=1 failed").unwrap().starts_with("🔄"));
    }
}
