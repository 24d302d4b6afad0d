//! tierproxy CLI
//!
//! Offline tooling for the translation core: split keys, show the backend
//! frames a client command turns into, and decode captured backend frames.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tierproxy::engine::{ClientId, Engine, Outbound};
use tierproxy::frontend::{reply, Command};
use tierproxy::policy::{BucketPolicy, PolicyReceiver};
use tierproxy::ring::StaticPool;
use tierproxy::translate::{self, GetOutcome};
use tierproxy::wire::{self, BackendResponse, RequestKind, HEADER_SIZE};
use tierproxy::{key, PoolConfig, ProxyError, QuorumPolicy, Result};

/// tierproxy CLI
#[derive(Parser, Debug)]
#[command(name = "tierproxy-cli")]
#[command(about = "Inspect how tierproxy translates between its tiers")]
struct Args {
    /// Read quorum sent with backend reads
    #[arg(long)]
    r: Option<u32>,

    /// Write quorum sent with backend writes
    #[arg(long)]
    w: Option<u32>,

    /// Replication factor sent with backend requests
    #[arg(long)]
    n: Option<u32>,

    /// Backend-side request timeout
    #[arg(long)]
    timeout_ms: Option<u32>,

    /// Namespace used for set keys without one
    #[arg(long, default_value = "sets")]
    set_bucket_type: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a client key into namespace, bucket and key
    Split {
        /// Client key, e.g. ns:bucket:key
        key: String,
    },

    /// Print the backend frames a client command produces
    Encode {
        /// Command and arguments, e.g. SADD bucket:key a b
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Decode a hex backend frame
    Decode {
        /// Request the frame answers
        #[arg(long, value_enum)]
        expect: Kind,

        /// Frame bytes in hex, header included; `-` reads stdin
        hex: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
    Get,
    Put,
    Delete,
    SetUpdate,
    SetFetch,
    CounterFetch,
    CounterUpdate,
}

impl From<Kind> for RequestKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Get => RequestKind::Get,
            Kind::Put => RequestKind::Put,
            Kind::Delete => RequestKind::Delete,
            Kind::SetUpdate => RequestKind::SetUpdate,
            Kind::SetFetch => RequestKind::SetFetch,
            Kind::CounterFetch => RequestKind::CounterFetch,
            Kind::CounterUpdate => RequestKind::CounterUpdate,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tierproxy=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = pool_config(&args);
    config.validate()?;

    match args.command {
        Commands::Split { key } => {
            let key = key::split(key.as_bytes())?;
            println!(
                "namespace: {}",
                String::from_utf8_lossy(key.namespace_or_default())
            );
            println!("bucket:    {}", String::from_utf8_lossy(&key.bucket));
            println!("key:       {}", String::from_utf8_lossy(&key.key));
            println!("canonical: {}", String::from_utf8_lossy(&key.join()));
        }
        Commands::Encode { command } => encode(config, command)?,
        Commands::Decode { expect, hex } => decode(expect.into(), &hex)?,
    }
    Ok(())
}

fn pool_config(args: &Args) -> PoolConfig {
    let mut quorum = QuorumPolicy::default();
    if let Some(r) = args.r {
        quorum = quorum.r(r);
    }
    if let Some(w) = args.w {
        quorum = quorum.w(w);
    }
    if let Some(n) = args.n {
        quorum = quorum.n(n);
    }
    if let Some(ms) = args.timeout_ms {
        quorum = quorum.timeout_ms(ms);
    }

    PoolConfig::builder()
        .name("cli")
        .quorum(quorum)
        .set_bucket_type(args.set_bucket_type.clone())
        .vclock_cache_capacity(0)
        .build()
}

/// Run a command through an engine with no cache tier and print what it sends
fn encode(config: PoolConfig, words: Vec<String>) -> Result<()> {
    let pool = Arc::new(StaticPool::new(Vec::<String>::new(), vec!["backend".to_string()]));
    let mut engine = Engine::new(config, pool, PolicyReceiver::fixed(BucketPolicy::new()));

    let command = Command::from_args(words.into_iter().map(Bytes::from).collect())?;
    debug!("encoding {}", command.name());
    engine.on_client_command(ClientId(0), command);

    for out in engine.drain_outbound() {
        match out {
            Outbound::Backend { server, data } => {
                let frame = wire::decode_frame(&data)?
                    .ok_or_else(|| ProxyError::Protocol("incomplete frame".to_string()))?;
                println!(
                    "backend {} code {} ({} bytes): {}",
                    server,
                    frame.code,
                    data.len(),
                    hex::encode(&data)
                );
            }
            Outbound::Reply { data, .. } => {
                println!("reply: {}", String::from_utf8_lossy(&data).escape_debug());
            }
            other => println!("{:?}", other),
        }
    }
    Ok(())
}

/// Frontend reply a client would see for a backend response
fn repack(response: &BackendResponse) -> Bytes {
    match response {
        BackendResponse::GetResult { .. } => match translate::get_outcome(response, &mut rand::thread_rng()) {
            Some(GetOutcome::Found { value, .. }) => reply::bulk(&value),
            _ => reply::nil(),
        },
        BackendResponse::PutAck { .. } => reply::ok(),
        BackendResponse::DeleteAck => reply::integer(1),
        BackendResponse::SetFetchResult { members, .. } => reply::members(members),
        BackendResponse::CounterValue(value) => reply::integer(*value),
        BackendResponse::UpdateAck => reply::ok(),
        BackendResponse::Error { message, .. } => reply::error(message),
    }
}

fn decode(kind: RequestKind, text: &str) -> Result<()> {
    let text = if text == "-" {
        let mut input = String::new();
        std::io::stdin().read_to_string(&mut input)?;
        input
    } else {
        text.to_string()
    };

    let bytes = hex::decode(text.trim())
        .map_err(|e| ProxyError::BadRequest(format!("invalid hex: {}", e)))?;
    let frame = wire::decode_frame(&bytes)?
        .ok_or_else(|| ProxyError::Malformed("frame is incomplete".to_string()))?;

    let payload = &bytes[HEADER_SIZE..frame.wire_len()];
    let response = wire::decode_response(frame.code, payload, kind)?;
    println!("{:#?}", response);
    println!("reply: {}", String::from_utf8_lossy(&repack(&response)).escape_debug());

    if frame.wire_len() < bytes.len() {
        println!("({} trailing bytes ignored)", bytes.len() - frame.wire_len());
    }
    Ok(())
}
