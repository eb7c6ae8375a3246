//! Binary entry point for the edge store service and its admin commands.
#![forbid(unsafe_code)]

use std::error::Error;
use std::io;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use edgestore::{
    config::{RelayConfig, ServiceConfig},
    relay::{feed_lines, open_feed, MemoryBroker, RelayConsumer, RelayStats},
    server::{self, install_tracing_subscriber, shutdown_signal},
    EdgeStore,
};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "edgestore",
    version,
    about = "Typed edge store with last-write-wins upserts",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "EDGESTORE_CONFIG",
        value_name = "FILE",
        help = "TOML config file (defaults to the per-user config when present)"
    )]
    config: Option<PathBuf>,

    #[command(flatten)]
    store: StoreArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(
        long,
        global = true,
        env = "EDGESTORE_DATABASE",
        value_name = "DB",
        help = "SQLite database file"
    )]
    database: Option<PathBuf>,

    #[arg(long, global = true, env = "EDGESTORE_POOL_SIZE", help = "Pooled SQLite connections")]
    pool_size: Option<usize>,

    #[arg(
        long,
        global = true,
        env = "EDGESTORE_BUSY_TIMEOUT_MS",
        help = "SQLite busy timeout in milliseconds"
    )]
    busy_timeout_ms: Option<u64>,

    #[arg(
        long,
        global = true,
        env = "EDGESTORE_MAX_BATCH_ROWS",
        help = "Rows per INSERT statement"
    )]
    max_batch_rows: Option<usize>,

    #[arg(
        long,
        global = true,
        env = "EDGESTORE_TRACE_SQL",
        help = "Log every SQL statement at debug level"
    )]
    trace_sql: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API, and the relay consumer when a feed is configured.
    Serve(ServeCmd),
    /// Create the table and indexes for an edge type.
    Init {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Drop the table for an edge type.
    Drop {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Run a read query and print the rows as JSON edges.
    Query {
        #[arg(value_name = "SQL")]
        sql: String,
    },
}

#[derive(Args, Debug)]
struct ServeCmd {
    #[arg(long, env = "EDGESTORE_HOST", value_name = "HOST", help = "Bind address host")]
    host: Option<IpAddr>,

    #[arg(long, env = "EDGESTORE_PORT", value_name = "PORT", help = "Bind address port")]
    port: Option<u16>,

    #[arg(
        long,
        env = "EDGESTORE_RELAY_INPUT",
        value_name = "FILE",
        help = "JSON-lines relay feed to consume (`-` for stdin)"
    )]
    relay_input: Option<PathBuf>,

    #[arg(
        long,
        env = "EDGESTORE_RELAY_CONCURRENCY",
        help = "Relay messages processed concurrently"
    )]
    relay_concurrency: Option<usize>,

    #[arg(
        long,
        env = "EDGESTORE_RELAY_ACK_DEADLINE_SECS",
        help = "Seconds before an unacknowledged relay message is redelivered"
    )]
    relay_ack_deadline_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    apply_store_args(&mut config, &cli.store);

    match cli.command {
        Command::Serve(cmd) => {
            install_tracing_subscriber("info");
            apply_serve_args(&mut config, cmd);
            run_serve(config).await?;
        }
        Command::Init { name } => {
            install_tracing_subscriber("warn");
            let store = EdgeStore::open(config.store_options())?;
            let created = store.ensure_type(&name)?;
            println!("{created} - edge has been created successfully");
        }
        Command::Drop { name } => {
            install_tracing_subscriber("warn");
            let store = EdgeStore::open(config.store_options())?;
            store.drop_type(&name)?;
            println!("{name} - edge has been dropped");
        }
        Command::Query { sql } => {
            install_tracing_subscriber("warn");
            let store = EdgeStore::open(config.store_options())?;
            let edges = store.run_query(&sql)?;
            println!("{}", serde_json::to_string_pretty(&edges)?);
        }
    }

    Ok(())
}

fn apply_store_args(config: &mut ServiceConfig, args: &StoreArgs) {
    if let Some(database) = &args.database {
        config.database = database.clone();
    }
    if let Some(pool_size) = args.pool_size {
        config.pool_size = pool_size;
    }
    if let Some(timeout) = args.busy_timeout_ms {
        config.busy_timeout_ms = timeout;
    }
    if let Some(rows) = args.max_batch_rows {
        config.max_batch_rows = rows;
    }
    if args.trace_sql {
        config.trace_sql = true;
    }
}

fn apply_serve_args(config: &mut ServiceConfig, cmd: ServeCmd) {
    if let Some(host) = cmd.host {
        config.host = host;
    }
    if let Some(port) = cmd.port {
        config.port = port;
    }
    if let Some(input) = cmd.relay_input {
        config.relay.input = Some(input);
    }
    if let Some(concurrency) = cmd.relay_concurrency {
        config.relay.concurrency = concurrency;
    }
    if let Some(secs) = cmd.relay_ack_deadline_secs {
        config.relay.ack_deadline_secs = secs;
    }
}

async fn run_serve(config: ServiceConfig) -> Result<(), Box<dyn Error>> {
    let store = EdgeStore::open(config.store_options())?;
    let (stop_tx, stop_rx) = watch::channel(false);

    let relay = config.relay.input.clone().map(|input| {
        let store = store.clone();
        let relay_config = config.relay.clone();
        let shutdown = stop_rx.clone();
        tokio::spawn(async move { run_relay(store, &relay_config, &input, shutdown).await })
    });

    let mut server_stop = stop_rx.clone();
    let mut server = tokio::spawn(server::serve(
        store,
        config.server_options(),
        async move {
            let _ = server_stop.wait_for(|stop| *stop).await;
        },
    ));

    let finished_early = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut server => Some(joined),
    };
    let _ = stop_tx.send(true);
    let served = match finished_early {
        Some(joined) => joined,
        None => server.await,
    };
    served??;

    if let Some(relay) = relay {
        let stats = relay.await??;
        info!(?stats, "relay finished");
    }
    Ok(())
}

async fn run_relay(
    store: EdgeStore,
    config: &RelayConfig,
    input: &Path,
    shutdown: watch::Receiver<bool>,
) -> io::Result<RelayStats> {
    let broker = MemoryBroker::new(config.ack_deadline(), Duration::from_secs(1));
    let reader = open_feed(input).await?;
    info!(input = %input.display(), "relay feed opened");
    let feeder = {
        let broker = broker.clone();
        tokio::spawn(async move { feed_lines(reader, &broker).await })
    };

    let consumer = RelayConsumer::new(store, config.concurrency);
    let stats = consumer.run(broker.subscribe(), shutdown).await;

    feeder.abort();
    if let Ok(Err(err)) = feeder.await {
        warn!(%err, "relay feed failed");
    }
    if broker.outstanding() > 0 {
        warn!(outstanding = broker.outstanding(), "relay stopped with unacknowledged messages");
    }
    Ok(stats)
}
