use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

/// One received line plus where it came from.
#[derive(Debug, Serialize)]
pub struct LineRecord<'a> {
    pub seq: usize,
    pub peer: &'a str,
    pub line: &'a str,
    pub chars: usize,
    pub timestamp: String,
}

impl<'a> LineRecord<'a> {
    pub fn new(seq: usize, peer: &'a str, line: &'a str) -> Self {
        Self {
            seq,
            peer,
            line,
            chars: line.chars().count(),
            timestamp: now_unix_seconds(),
        }
    }
}

pub fn print_line(record: &LineRecord<'_>, format: OutputFormat) {
    println!("{}", render_line(record, format));
}

pub fn render_line(record: &LineRecord<'_>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SEQ", "PEER", "CHARS", "LINE"])
                .add_row(vec![
                    record.seq.to_string(),
                    record.peer.to_string(),
                    record.chars.to_string(),
                    record.line.to_string(),
                ]);
            table.to_string()
        }
        OutputFormat::Pretty => format!(
            "#{} peer={} chars={} line={:?}",
            record.seq, record.peer, record.chars, record.line
        ),
        OutputFormat::Raw => record.line.to_string(),
    }
}

pub fn flush_stdout() {
    let _ = std::io::stdout().flush();
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
