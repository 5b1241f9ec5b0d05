mod logging;
mod relay;

use anyhow::Result;
use chrono::SecondsFormat;
use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Table, row};
use serde::Serialize;
use std::net::SocketAddr;
use ufanet_core::UfanetClient;
use ufanet_core::config::Config;
use ufanet_core::models::*;

#[derive(Parser)]
#[command(name = "ufanet", version)]
#[command(about = "CLI and HTTP relay for Ufanet intercoms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print current configuration (redacts the password).
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
    /// Run the HTTP relay exposing GET /intercoms/open
    Serve {
        /// Listen address; defaults to UFANET_BIND or 0.0.0.0:8080
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Intercom helpers
    Intercoms {
        #[command(subcommand)]
        cmd: IntercomsCommands,
    },
    /// Call history
    History {
        #[command(subcommand)]
        cmd: HistoryCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective config
    Doctor,
}

#[derive(Subcommand)]
enum IntercomsCommands {
    /// List intercoms on the contract
    List {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Open one intercom
    Open {
        id: i64,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Open every intercom on the contract
    OpenAll {
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// One page of the call log
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 25)]
        page_size: u32,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Video and preview links for one call
    Links {
        uuid: String,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Serialize)]
struct OpenOutcome {
    id: i64,
    opened: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Doctor => {
                let report = config.doctor();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).expect("serializable doctor report")
                );
                Ok(())
            }
        },
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or(config.bind);
            let client = UfanetClient::new(config)?;
            relay::serve(client, bind).await
        }
        Commands::Intercoms { cmd } => {
            let mut client = UfanetClient::new(config)?;
            let outcome = run_intercoms(cmd, &mut client).await;
            client.close();
            outcome
        }
        Commands::History { cmd } => {
            let mut client = UfanetClient::new(config)?;
            let outcome = run_history(cmd, &mut client).await;
            client.close();
            outcome
        }
    }
}

async fn run_intercoms(cmd: IntercomsCommands, client: &mut UfanetClient) -> Result<()> {
    match cmd {
        IntercomsCommands::List { format } => {
            let intercoms = client.list_intercoms().await?;
            emit_json_or_table(format, &intercoms, |items| intercom_table(items));
        }
        IntercomsCommands::Open { id, format } => {
            let opened = client.open_intercom(id).await?;
            emit_json_or_table(format, &OpenOutcome { id, opened }, |o| {
                let mut table = Table::new();
                table.add_row(row!["id", o.id]);
                table.add_row(row!["opened", o.opened]);
                table
            });
        }
        IntercomsCommands::OpenAll { format } => {
            let outcomes: Vec<OpenOutcome> = relay::open_all(client)
                .await?
                .into_iter()
                .map(|(id, opened)| OpenOutcome { id, opened })
                .collect();
            emit_json_or_table(format, &outcomes, |items| {
                let mut table = Table::new();
                table.add_row(row!["id", "opened"]);
                for o in items {
                    table.add_row(row![o.id, o.opened]);
                }
                table
            });
        }
    }
    Ok(())
}

async fn run_history(cmd: HistoryCommands, client: &mut UfanetClient) -> Result<()> {
    match cmd {
        HistoryCommands::List {
            page,
            page_size,
            format,
        } => {
            let history = client.call_history(HistoryQuery { page, page_size }).await?;
            emit_json_or_table(format, &history, history_table);
        }
        HistoryCommands::Links { uuid, format } => {
            let links = client.call_history_links(&uuid).await?;
            emit_json_or_table(format, &links, |l| {
                let mut table = Table::new();
                table.add_row(row!["url", l.url]);
                table.add_row(row!["preview", l.preview]);
                table
            });
        }
    }
    Ok(())
}

fn intercom_table(items: &[Intercom]) -> Table {
    let mut table = Table::new();
    table.add_row(row!["id", "name", "house", "open_type", "blocked", "favourite"]);
    for i in items {
        table.add_row(row![
            i.id,
            i.display_name(),
            i.house,
            i.open_type,
            i.is_blocked,
            i.is_fav
        ]);
    }
    table
}

fn history_table(history: &History) -> Table {
    let mut table = Table::new();
    table.add_row(row!["called_at", "address", "porch", "flat", "uuid"]);
    for call in &history.results {
        table.add_row(row![
            call.called_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            call.address,
            call.porch,
            call.flat,
            call.uuid
        ]);
    }
    table.add_row(row!["total", history.count, "", "", ""]);
    table
}

fn emit_json_or_table<T: Serialize + ?Sized>(
    format: OutputFormat,
    value: &T,
    table_builder: impl FnOnce(&T) -> Table,
) {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).expect("serializable output");
            println!("{json}");
        }
        OutputFormat::Table => {
            let table = table_builder(value);
            table.printstd();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_list_parses_paging_flags() {
        let cli = Cli::try_parse_from(["ufanet", "history", "list", "--page", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::History {
                cmd: HistoryCommands::List { page: 3, page_size: 25, .. }
            }
        ));
    }

    #[test]
    fn intercom_subcommands_parse() {
        let cli = Cli::try_parse_from(["ufanet", "intercoms", "open", "42"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Intercoms {
                cmd: IntercomsCommands::Open { id: 42, .. }
            }
        ));

        let cli = Cli::try_parse_from(["ufanet", "intercoms", "open-all", "--format", "table"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Intercoms {
                cmd: IntercomsCommands::OpenAll {
                    format: OutputFormat::Table
                }
            }
        ));
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
