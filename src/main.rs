use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, ValueEnum};

use moneta::ledger::Ledger;
use moneta::providers::{
    EmbeddingProvider, ExtractiveGenerator, GenerationProvider, HashEmbedder, OllamaEmbedder,
    OllamaGenerator,
};
use moneta::rag::RagEngine;
use moneta::server;
use moneta::snapshot::SnapshotStore;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(long, default_value = "127.0.0.1:7700")]
    addr: String,

    #[clap(long, default_value = "data")]
    data_dir: PathBuf,

    #[clap(long, value_enum, default_value_t = Provider::Offline)]
    provider: Provider,

    #[clap(long, default_value = "http://127.0.0.1:11434")]
    ollama_url: String,

    #[clap(long, default_value = "nomic-embed-text")]
    embed_model: String,

    #[clap(long, default_value = "llama3.2")]
    gen_model: String,

    /// Embedding width. Must match what the embedding model emits.
    #[clap(long, default_value = "384")]
    dimension: usize,

    #[clap(long, default_value = "120")]
    timeout_secs: u64,
}

#[derive(ValueEnum, Clone, Debug)]
enum Provider {
    Offline,
    Ollama,
}

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info,moneta=info");
    }
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    if args.dimension == 0 {
        eprintln!("--dimension must be at least 1");
        std::process::exit(1);
    }
    let addr: SocketAddr = args
        .addr
        .parse()
        .expect("--addr must be a host:port address");

    println!("--- [moneta RAG Engine] ---");
    println!("Provider:  {:?}", args.provider);
    println!("Data Dir:  {}", args.data_dir.display());
    println!("Dimension: {}", args.dimension);
    println!("---------------------------");

    let (embedder, generator): (Arc<dyn EmbeddingProvider>, Arc<dyn GenerationProvider>) =
        match args.provider {
            Provider::Offline => (
                Arc::new(HashEmbedder::new(args.dimension)),
                Arc::new(ExtractiveGenerator::new()),
            ),
            Provider::Ollama => {
                let http_client = reqwest::Client::builder()
                    .timeout(Duration::from_secs(args.timeout_secs))
                    .build()
                    .expect("Failed to build HTTP client");
                (
                    Arc::new(OllamaEmbedder::new(
                        args.ollama_url.clone(),
                        args.embed_model.clone(),
                        args.dimension,
                        http_client.clone(),
                    )),
                    Arc::new(OllamaGenerator::new(
                        args.ollama_url.clone(),
                        args.gen_model.clone(),
                        http_client,
                    )),
                )
            }
        };

    println!("Initializing Engine State...");
    let snapshot = SnapshotStore::new(args.data_dir.join("vectors.idx"));
    let engine = Arc::new(
        RagEngine::open(snapshot, args.dimension, embedder, generator)
            .expect("Failed to open engine state"),
    );
    let ledger = Arc::new(Mutex::new(Ledger::new(
        args.data_dir.join("transactions.json"),
    )));

    let engine_clone = engine.clone();
    let ledger_clone = ledger.clone();
    tokio::spawn(async move {
        server::run(engine_clone, ledger_clone, addr).await;
    });

    println!("moneta HTTP API listening on {}", args.addr);
    println!("Node is Ready.");

    tokio::signal::ctrl_c().await.unwrap();
    println!("Shutting down.");
}
