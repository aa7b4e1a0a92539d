use std::{collections::HashMap, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use helpdesk_client::{
    api_logs::{self, ApiLogListing, DEFAULT_LOG_FILTER},
    bulk_update::{BulkUpdateOrchestrator, COOLDOWN_TOOLTIP},
    categories,
    connection::check_connection,
    ConsolePage, HttpBackend, PageHost, TicketBackend,
};
use shared::{
    domain::{CategoryKind, LogId, TicketId},
    protocol::{CategoryQuery, ConnectionTarget},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(name = "deskctl", about = "Help-desk agent console")]
struct Cli {
    /// Controller endpoint, e.g. https://host/otrs/index.pl
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[arg(long, global = true)]
    session_id: Option<String>,
    #[arg(long, global = true)]
    challenge_token: Option<String>,
    /// Answer yes to confirmation prompts.
    #[arg(long, global = true)]
    yes: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Push the selected tickets to ServiceNow one at a time.
    BulkUpdate {
        #[arg(long = "ticket", required = true)]
        tickets: Vec<TicketId>,
        /// Tickets updated within the cooldown window.
        #[arg(long = "cooldown")]
        cooldown: Vec<TicketId>,
        /// Offer to unlink tickets whose update failed.
        #[arg(long)]
        unlink_failed: bool,
    },
    /// Clear the ServiceNow link of the given tickets.
    Unlink {
        #[arg(long = "ticket", required = true)]
        tickets: Vec<TicketId>,
    },
    /// List the options of one category tier.
    Categories {
        #[arg(long)]
        kind: CategoryKind,
        #[arg(long)]
        tier: usize,
        #[arg(long = "parent")]
        parents: Vec<String>,
    },
    CheckConnection {
        target: ConnectionTarget,
    },
    /// Show the eBonding API call history, or one call's payloads.
    ApiLogs {
        /// Period to list, e.g. 24h or 7d.
        #[arg(long, default_value = DEFAULT_LOG_FILTER)]
        filter: String,
        #[arg(long)]
        details: Option<LogId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();

    let mut settings = config::load_settings();
    if let Some(base_url) = cli.base_url {
        settings.base_url = base_url;
    }
    if let Some(session_id) = cli.session_id {
        settings.session_id = Some(session_id);
    }
    if let Some(token) = cli.challenge_token {
        settings.challenge_token = Some(token);
    }
    let base_url = config::normalize_base_url(&settings.base_url)?;
    info!(%base_url, "using help-desk endpoint");

    let backend: Arc<dyn TicketBackend> =
        Arc::new(HttpBackend::new(base_url, settings.session()));
    let page = Arc::new(ConsolePage::new(cli.yes));

    match cli.command {
        Command::BulkUpdate {
            tickets,
            cooldown,
            unlink_failed,
        } => {
            let cooldown: HashMap<TicketId, String> = cooldown
                .into_iter()
                .map(|id| (id, COOLDOWN_TOOLTIP.to_string()))
                .collect();
            let bulk = BulkUpdateOrchestrator::new(
                backend,
                page.clone(),
                cooldown,
                settings.bulk_options(),
            );
            for ticket_id in tickets {
                if let Err(err) = bulk.select(ticket_id).await {
                    println!("skipping ticket {ticket_id}: {err}");
                }
            }

            let result = bulk.run().await.context("bulk update did not run")?;
            println!("{}", serde_json::to_string_pretty(&result)?);

            if unlink_failed
                && !result.failures.is_empty()
                && page.confirm(&format!(
                    "Unlink {} failed tickets from ServiceNow?",
                    result.failures.len()
                ))
            {
                bulk.unlink_failed_tickets(&result.failures)
                    .await
                    .context("unlink failed")?;
            }
        }
        Command::Unlink { tickets } => {
            let bulk = BulkUpdateOrchestrator::new(
                backend,
                page,
                HashMap::new(),
                settings.bulk_options(),
            );
            let unlinked = bulk
                .unlink_tickets(&tickets)
                .await
                .context("unlink failed")?;
            println!("unlinked {unlinked} tickets");
        }
        Command::Categories {
            kind,
            tier,
            parents,
        } => {
            let options = categories::load_options(
                backend.as_ref(),
                CategoryQuery {
                    kind,
                    tier,
                    parents,
                },
            )
            .await
            .with_context(|| format!("failed to load {} tier {tier}", kind.display_name()))?;
            for option in options {
                println!("{}\t{}", option.id, option.name);
            }
        }
        Command::CheckConnection { target } => {
            let report = check_connection(backend.as_ref(), target).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                anyhow::bail!("{}", report.message);
            }
        }
        Command::ApiLogs {
            details: Some(log_id),
            ..
        } => {
            let details = api_logs::log_details(backend.as_ref(), log_id).await?;
            println!("Request:\n{}\n\nResponse:\n{}", details.request, details.response);
        }
        Command::ApiLogs {
            filter,
            details: None,
        } => match api_logs::load_api_logs(backend.as_ref(), &filter).await {
            ApiLogListing::Rows(rows) => {
                for row in rows {
                    println!(
                        "{}\t{}\t{}\t{}\t{}\t{}",
                        row.id,
                        row.created,
                        row.incident,
                        if row.success { "Success" } else { "Failed" },
                        row.msi_ticket,
                        row.error
                    );
                }
            }
            ApiLogListing::Empty => println!("{}", api_logs::NO_API_LOGS_MESSAGE),
            ApiLogListing::Failed(message) => anyhow::bail!("{message}"),
        },
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
