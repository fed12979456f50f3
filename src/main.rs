use chordring::{
    chord::Transport,
    config::ChordConfig,
    logging,
    network::{grpc::GrpcTransport, ChordPeer},
    simulation::{run_experiment, write_csv},
};
use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(name = "chordring")]
#[command(about = "A self-stabilizing Chord ring in Rust")]
struct Cli {
    /// JSON file with ring tunables; flags below override it
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Address to bind and advertise
    #[arg(short = 'n', long = "host", global = true)]
    host: Option<String>,

    /// Local gRPC port (random if not specified)
    #[arg(short = 'p', long = "port", global = true)]
    port: Option<u16>,

    /// Log level: off, error, warn, info, debug or trace
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new ring (first node in the network)
    #[command(name = "start-bootstrap")]
    StartBootstrap,
    /// Join an existing ring through any of its members
    #[command(name = "join")]
    Join {
        /// Address of a ring member, e.g. 127.0.0.1:7000
        #[arg(short = 'b', long = "bootstrap")]
        bootstrap: String,
    },
    /// Ask a running node which member owns a key
    #[command(name = "lookup")]
    Lookup {
        /// Address of the node to ask
        #[arg(long = "node")]
        node: String,
        key: String,
    },
    /// Measure lookup latency against ring size on an in-process network
    #[command(name = "simulate")]
    Simulate {
        /// Ring sizes, comma separated
        #[arg(long = "nodes", value_delimiter = ',', default_value = "4,8,16,32")]
        nodes: Vec<usize>,
        /// Lookups per ring size
        #[arg(long = "lookups", default_value_t = 200)]
        lookups: usize,
        /// CSV output file (stdout if not specified)
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(long = "seed", default_value_t = 1)]
        seed: u64,
    },
}

fn load_config(cli: &Cli) -> Result<ChordConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ChordConfig::from_file(path)
            .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?,
        None => ChordConfig::default(),
    };
    if let Some(host) = &cli.host {
        config.addr = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let level = LevelFilter::from_str(&cli.log_level)
        .map_err(|_| format!("Unknown log level: {}", cli.log_level))?;
    logging::init(config.logging, level).map_err(|e| format!("Failed to init logging: {}", e))?;

    match cli.command {
        Commands::StartBootstrap => {
            info!("Initializing bootstrap node...");
            let mut peer = ChordPeer::new(config)
                .await
                .map_err(|e| format!("Failed to create peer: {}", e))?;

            if let Err(e) = peer.create_network().await {
                error!("Failed to create network: {}", e);
                return Err(format!("Failed to create network: {}", e));
            }
            info!(
                "Other nodes can join using: chordring join -b {}",
                peer.node().local().addr
            );

            peer.run().await.map_err(|e| format!("Bootstrap node error: {}", e))
        }
        Commands::Join { bootstrap } => {
            info!("Initializing node to join network...");
            let mut peer = ChordPeer::new(config)
                .await
                .map_err(|e| format!("Failed to create peer: {}", e))?;

            info!("Joining network through bootstrap node: {}", bootstrap);
            if let Err(e) = peer.join(&bootstrap).await {
                error!("Failed to join network: {}", e);
                let _ = peer.shutdown().await;
                return Err(format!("Failed to join network: {}", e));
            }
            info!("Successfully joined the network on port {}", peer.get_port());

            peer.run().await.map_err(|e| format!("Node error: {}", e))
        }
        Commands::Lookup { node, key } => {
            let space = config.id_space().map_err(|e| e.to_string())?;
            let id = space.hash(key.as_bytes());
            let transport = GrpcTransport::new(&config);

            let owner = tokio::time::timeout(
                config.timeout() + Duration::from_millis(100),
                transport.find_successor(&node, id),
            )
            .await
            .map_err(|_| format!("Lookup through {} timed out", node))?
            .map_err(|e| format!("Lookup through {} failed: {}", node, e))?;

            println!("{} -> {} (id {})", key, owner.addr, owner.id);
            Ok(())
        }
        Commands::Simulate {
            nodes,
            lookups,
            output,
            seed,
        } => {
            let samples = run_experiment(&nodes, lookups, &config, seed)
                .await
                .map_err(|e| format!("Simulation failed: {}", e))?;

            let written = match output {
                Some(path) => {
                    let file = File::create(&path)
                        .map_err(|e| format!("Failed to create {}: {}", path.display(), e))?;
                    write_csv(BufWriter::new(file), &samples)
                }
                None => write_csv(std::io::stdout().lock(), &samples),
            };
            written.map_err(|e| format!("Failed to write results: {}", e))?;

            let failures = samples.iter().filter(|s| !s.correct).count();
            info!("{} lookups measured, {} incorrect", samples.len(), failures);
            Ok(())
        }
    }
}
