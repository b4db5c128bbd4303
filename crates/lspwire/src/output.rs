use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use lspwire_frame::RequestId;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of one `call`.
#[derive(Serialize)]
pub struct CallOutput<'a> {
    pub method: &'a str,
    pub id: &'a RequestId,
    pub result: &'a Value,
    pub elapsed_ms: u64,
}

pub fn render_call(out: &CallOutput<'_>, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Pretty => {
            serde_json::to_string_pretty(out.result).unwrap_or_else(|_| "null".to_string())
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["METHOD", "ID", "ELAPSED", "RESULT"])
                .add_row(vec![
                    out.method.to_string(),
                    out.id.to_string(),
                    format!("{}ms", out.elapsed_ms),
                    out.result.to_string(),
                ]);
            table.to_string()
        }
    }
}

pub fn print_call(out: &CallOutput<'_>, format: OutputFormat) {
    println!("{}", render_call(out, format));
}
