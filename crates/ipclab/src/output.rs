use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use ipclab_event::LineFormat;
use ipclab_worker::{ShmMode, TransportKind};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }

    pub fn line_format(self) -> LineFormat {
        match self {
            OutputFormat::Json => LineFormat::Json,
            OutputFormat::Pretty => LineFormat::Pretty,
        }
    }
}

#[derive(Serialize)]
struct TransportOutput<'a> {
    name: &'a str,
    workers: Vec<&'a str>,
    description: &'a str,
}

fn transport_rows() -> Vec<TransportOutput<'static>> {
    TransportKind::ALL
        .iter()
        .map(|kind| {
            let mut workers = kind.labels(ShmMode::Counter).to_vec();
            if *kind == TransportKind::SharedMemory {
                workers.extend(ShmMode::Message.labels());
            }
            TransportOutput {
                name: kind.name(),
                workers,
                description: kind.description(),
            }
        })
        .collect()
}

pub fn print_transports(format: OutputFormat) {
    let rows = transport_rows();
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Pretty => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TRANSPORT", "WORKERS", "DESCRIPTION"]);
            for row in &rows {
                table.add_row(vec![
                    row.name.to_string(),
                    row.workers.join(", "),
                    row.description.to_string(),
                ]);
            }
            println!("{table}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shm_row_lists_both_modes() {
        let rows = transport_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].name, "shm");
        assert_eq!(rows[2].workers, vec!["PROCESS 1", "PROCESS 2", "WRITER", "READER"]);
    }
}
