use std::{path::PathBuf, process::exit, sync::Arc, time::Duration};

use clap::{Args, Parser, Subcommand};
use neck_connect::{
    address::parse, BoxedError, ConnStream, Connector, ConnectorConfig, Scheme, SecureConnector,
    StaticTargetConnector, TcpConnector, TlsOptions,
};
use serde_json::{Map, Value};
use tokio::{
    io::{self, AsyncWriteExt},
    select, signal,
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[clap(name = "neck-connect")]
struct Cli {
    /// Log level written to stderr.
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Connect once, then report the peer and how long it took
    Probe(ConnectArgs),
    /// Connect and pipe stdin/stdout through the connection
    Connect(ConnectArgs),
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Target such as "example.com:80", "tls://example.com:443" or "unix:///run/app.sock"
    target: String,

    /// Connect timeout in seconds defaults 30.
    #[arg(long)]
    timeout: Option<f64>,

    /// Upgrade the connection to TLS (implied by a tls:// target).
    #[clap(long, action)]
    tls: bool,

    /// Specify the domain for TLS, using the hostname of target by default.
    #[arg(long)]
    tls_domain: Option<String>,

    /// Skip certificate and hostname verification.
    #[clap(long, action)]
    insecure: bool,

    /// Always dial this host:port instead, e.g. a TLS-terminating proxy.
    #[arg(long)]
    via: Option<String>,

    /// Context options as a JSON object, e.g. '{"tcp_nodelay": true}'.
    #[arg(long)]
    context: Option<String>,

    /// JSON config file with "connect_timeout" and "context".
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging(log_level: &str) {
    let log_level = match log_level {
        "error" => Level::ERROR,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::WARN,
    };
    // stdout carries connection data.
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(args: &ConnectArgs) -> Result<ConnectorConfig, BoxedError> {
    let mut config = match &args.config {
        Some(path) => ConnectorConfig::from_json(&tokio::fs::read_to_string(path).await?)?,
        None => ConnectorConfig::default(),
    };
    if let Some(seconds) = args.timeout {
        let timeout = Duration::try_from_secs_f64(seconds)
            .ok()
            .filter(|t| !t.is_zero())
            .ok_or("--timeout must be a positive number of seconds")?;
        config = config.with_timeout(timeout);
    }
    if let Some(text) = &args.context {
        let map: Map<String, Value> = serde_json::from_str(text)?;
        config = config.with_context(&map)?;
    }
    Ok(config)
}

/// Build the connector chain described by `args` and run it.
async fn open(args: &ConnectArgs, cancel: CancellationToken) -> Result<ConnStream, BoxedError> {
    let target = parse(&args.target)?;
    let tcp = TcpConnector::new(load_config(args).await?);

    if target.scheme == Scheme::Unix {
        let context = tcp.config().context.clone();
        return Ok(tcp
            .create_socket_for_address(&target, &context, cancel)
            .await?);
    }
    let port = target.require_port()?;

    let mut connector: Arc<dyn Connector> = Arc::new(tcp);
    if let Some(via) = &args.via {
        let proxy = parse(via)?;
        let proxy_port = proxy.require_port()?;
        connector = Arc::new(StaticTargetConnector::new(connector, proxy.host, proxy_port));
    }
    if args.tls || target.scheme == Scheme::Tls {
        let mut tls = TlsOptions {
            peer_name: args.tls_domain.clone(),
            sni_server_name: args.tls_domain.clone(),
            ..Default::default()
        };
        if args.insecure {
            tls.verify_peer = Some(false);
            tls.verify_peer_name = Some(false);
        }
        connector = Arc::new(SecureConnector::new(connector).with_tls_options(&tls));
    }

    Ok(connector
        .create_cancellable(&target.host, port, cancel)
        .await?)
}

async fn probe(args: ConnectArgs, cancel: CancellationToken) -> Result<(), BoxedError> {
    let start = Instant::now();
    let mut stream = open(&args, cancel).await?;
    let elapsed = start.elapsed();

    println!(
        "{} -> {} in {:?}{}",
        args.target,
        stream.peer_name(),
        elapsed,
        if stream.is_encrypted() { " (tls)" } else { "" }
    );
    // The peer may hang up first.
    let _ = stream.shutdown().await;
    Ok(())
}

async fn pipe(args: ConnectArgs, cancel: CancellationToken) -> Result<(), BoxedError> {
    let stream = open(&args, cancel.clone()).await?;
    info!(peer = %stream.peer_name(), encrypted = stream.is_encrypted(), "connected");

    let (mut r, mut w) = io::split(stream);
    let mut stdin = io::stdin();
    let mut stdout = io::stdout();

    let upload = async {
        io::copy(&mut stdin, &mut w).await?;
        // Half-close so the peer sees EOF and can finish its answer.
        w.shutdown().await
    };
    let download = async {
        io::copy(&mut r, &mut stdout).await?;
        stdout.flush().await
    };
    tokio::pin!(download);

    // The peer closing ends the session. Stdin reaching EOF does not.
    select! {
        res = &mut download => { res?; }
        res = upload => {
            res?;
            select! {
                res = &mut download => { res?; }
                _ = cancel.cancelled() => info!("interrupted"),
            }
        }
        _ = cancel.cancelled() => info!("interrupted"),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    // Ctrl-C cancels whatever stage the connection is in.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let result = match cli.command {
        Commands::Probe(args) => probe(args, cancel).await,
        Commands::Connect(args) => pipe(args, cancel).await,
    };

    if let Err(e) = result {
        eprintln!("{e}");
        exit(1);
    }
}
