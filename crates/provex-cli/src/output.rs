use provex_core::ResultEnvelope;
use serde::Serialize;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::Outcome;
use crate::error::CliError;

pub fn render(outcome: &Outcome, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match (outcome, format) {
        (Outcome::Envelope(envelope), OutputFormat::Json) => print_json(envelope, pretty),
        (Outcome::Listing(listing), OutputFormat::Json) => print_json(listing, pretty),
        (Outcome::Envelope(envelope), OutputFormat::Table) => render_envelope_table(envelope),
        (Outcome::Listing(listing), OutputFormat::Table) => render_listing_table(listing),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), CliError> {
    let payload = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{payload}");
    Ok(())
}

fn render_envelope_table(envelope: &ResultEnvelope) -> Result<(), CliError> {
    let meta = envelope.metadata();
    println!("request_id  : {}", meta.request_id);
    println!("command     : {}", meta.command);
    println!("schema      : {}", meta.schema_version);
    println!("generated_at: {}", meta.generated_at);
    println!("provider    : {}", envelope.provider().unwrap_or("-"));
    println!("duration_ms : {}", meta.duration_ms);
    println!("cache_hit   : {}", meta.cache_hit);
    println!("attempts    : {}", meta.attempts);
    println!("records     : {}", meta.record_count);

    if !envelope.warnings().is_empty() {
        println!("warnings:");
        for warning in envelope.warnings() {
            let category = serde_json::to_value(warning.category)?;
            println!(
                "  - [{}] {}",
                category.as_str().unwrap_or("warning"),
                warning.message
            );
        }
    }

    println!("results:");
    print_indented(&serde_json::to_string_pretty(envelope.results())?);

    if let Some(error) = envelope.error() {
        println!("error:");
        println!("  - {error}");
    }

    Ok(())
}

fn render_listing_table(listing: &Value) -> Result<(), CliError> {
    match listing {
        Value::Array(entries) => {
            for entry in entries {
                let title = entry
                    .get("path")
                    .or_else(|| entry.get("name"))
                    .and_then(Value::as_str)
                    .unwrap_or("-");
                println!("{title}");
                print_indented(&serde_json::to_string_pretty(entry)?);
            }
        }
        other => print_indented(&serde_json::to_string_pretty(other)?),
    }
    Ok(())
}

fn print_indented(text: &str) {
    for line in text.lines() {
        println!("  {line}");
    }
}
