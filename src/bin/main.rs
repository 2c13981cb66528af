// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Context;
use clap::{Parser, Subcommand};
use seating_ledger_rs::postgres::PgStore;
use seating_ledger_rs::{
    CapacityPolicy, Ledger, LedgerConfig, MemoryStore, SeatingStore, StoreKind, http, logging,
    replay,
};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seating-ledger")]
#[command(about = "Guest list and table seating for an event venue", long_about = None)]
struct Cli {
    /// How seat checks count other parties at the same table
    #[arg(
        long,
        global = true,
        value_enum,
        env = "SEATING_CAPACITY_POLICY",
        default_value_t = CapacityPolicy::PerParty
    )]
    capacity_policy: CapacityPolicy,

    /// Where tables and guests are kept
    #[arg(
        long,
        global = true,
        value_enum,
        env = "SEATING_STORE",
        default_value_t = StoreKind::Memory
    )]
    store: StoreKind,

    /// PostgreSQL connection string, required with `--store postgres`
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Connections per database pool
    #[arg(long, global = true, env = "SEATING_DB_MAX_CONNECTIONS", default_value_t = 10)]
    db_max_connections: u32,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, env = "SEATING_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "SEATING_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "SEATING_HOST", default_value = "127.0.0.1")]
        host: String,

        #[arg(long, env = "PORT", default_value_t = 3000)]
        port: u16,
    },
    /// Replay a CSV seating plan and print a per-table report
    ///
    /// Expected format: op,name,table,capacity,allowed_extras,guests
    /// Example: seating-ledger replay plan.csv > report.csv
    Replay {
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(&cli.log_level, cli.log_json) {
        eprintln!("Error initialising logging: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = LedgerConfig::with_policy(cli.capacity_policy);

    match cli.store {
        StoreKind::Memory => execute(cli.command, Ledger::with_config(MemoryStore::new(), config)).await,
        StoreKind::Postgres => {
            let url = cli
                .database_url
                .context("--database-url or DATABASE_URL is required with --store postgres")?;
            let store = PgStore::connect(&url, cli.db_max_connections)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("migrating schema")?;
            execute(cli.command, Ledger::with_config(store, config)).await
        }
    }
}

async fn execute<S>(command: Command, ledger: Ledger<S>) -> anyhow::Result<()>
where
    S: SeatingStore + 'static,
{
    let ledger = Arc::new(ledger);

    match command {
        Command::Serve { host, port } => serve(ledger, &host, port).await,
        Command::Replay { input } => {
            let file = File::open(&input)
                .with_context(|| format!("opening '{}'", input.display()))?;
            // The ledger blocks on its store; keep it off the async workers.
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let summary = replay::replay(&*ledger, BufReader::new(file))?;
                info!(
                    applied = summary.applied,
                    rejected = summary.rejected,
                    skipped = summary.skipped,
                    "replay finished"
                );
                replay::write_report(&*ledger, std::io::stdout())?;
                Ok(())
            })
            .await
            .context("replay task failed")?
        }
    }
}

async fn serve<S>(ledger: Arc<Ledger<S>>, host: &str, port: u16) -> anyhow::Result<()>
where
    S: SeatingStore + 'static,
{
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    info!(%addr, policy = %ledger.config().capacity_policy, "seating ledger listening");

    let app = http::router(ledger);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
}
