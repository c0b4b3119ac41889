//! # Homebase Index CLI (`hbi`)
//!
//! ## Usage
//!
//! ```bash
//! hbi --config ./config/hbi.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `hbi init` | Create the SQLite database and schema |
//! | `hbi scan <images\|documents> [ROOTS..]` | Incrementally index roots |
//! | `hbi prune <images\|documents> [ROOTS..]` | Drop records for deleted files |
//! | `hbi person add <NAME>` / `hbi person list` | Manage persons |
//! | `hbi face list [--unresolved]` | List detected faces |
//! | `hbi face link <FACE_ID> <NAME>` / `hbi face unlink <FACE_ID>` | Assign faces |
//! | `hbi search person <NAME>` | Photos containing a person |
//! | `hbi search documents <QUERY> [--k N]` | Semantic document search |
//! | `hbi stats` | Index counts |
//! | `hbi serve` | Start the HTTP server |
//!
//! Logs go to stderr and honour `RUST_LOG`; results go to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use homebase_index::config::{self, Config};
use homebase_index::migrate;
use homebase_index::models::{Pipeline, ScanReport};
use homebase_index::server;
use homebase_index::services::Services;
use homebase_index::stats;

/// Homebase Index: incremental local photo and document indexing.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/hbi.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "hbi",
    about = "Homebase Index: incremental local photo and document indexing",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/hbi.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Scan roots and index new or changed files.
    ///
    /// Unchanged files (same content hash) are skipped without extraction.
    /// Roots default to `scan.image_roots` / `scan.document_roots`.
    Scan {
        /// `images` or `documents`.
        pipeline: Pipeline,
        /// Directories to scan.
        roots: Vec<PathBuf>,
    },

    /// Remove records whose files no longer exist under the given roots.
    Prune {
        pipeline: Pipeline,
        roots: Vec<PathBuf>,
    },

    /// Manage persons.
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },

    /// Inspect and assign detected faces.
    Face {
        #[command(subcommand)]
        action: FaceAction,
    },

    /// Query the index.
    Search {
        #[command(subcommand)]
        target: SearchTarget,
    },

    /// Show index statistics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum PersonAction {
    /// Register a new person.
    Add { name: String },
    /// List registered persons.
    List,
}

#[derive(Subcommand)]
enum FaceAction {
    /// List faces, optionally only those not yet linked to a person.
    List {
        #[arg(long)]
        unresolved: bool,
    },
    /// Link a face to a person by name.
    Link { face_id: i64, person: String },
    /// Return a face to the unresolved state.
    Unlink { face_id: i64 },
}

#[derive(Subcommand)]
enum SearchTarget {
    /// Photos in which the named person appears.
    Person { name: String },
    /// Documents semantically closest to a query.
    Documents {
        query: String,
        /// Number of results (defaults to `retrieval.default_k`).
        #[arg(long)]
        k: Option<usize>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,homebase_index=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        migrate::run_migrations(&cfg).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let services = Services::from_config(cfg.clone()).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Scan { pipeline, roots } => {
            let roots = roots_or_configured(roots, pipeline, &cfg);
            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received; stopping after the current file");
                    trigger.cancel();
                }
            });

            let report = services.scanner.scan(&roots, pipeline, &cancel).await?;
            print_report(pipeline, &report);
        }
        Commands::Prune { pipeline, roots } => {
            let roots = roots_or_configured(roots, pipeline, &cfg);
            let removed = services.scanner.prune(&roots, pipeline).await?;
            println!("Pruned {}: {} removed", pipeline, removed);
        }
        Commands::Person { action } => match action {
            PersonAction::Add { name } => {
                let person = services.index.create_person(&name).await?;
                println!("Added person {} ({})", person.name, person.id);
            }
            PersonAction::List => {
                let persons = services.index.list_persons().await?;
                if persons.is_empty() {
                    println!("No persons.");
                }
                for p in persons {
                    println!("{:>6}  {}", p.id, p.name);
                }
            }
        },
        Commands::Face { action } => match action {
            FaceAction::List { unresolved } => {
                let faces = services.index.list_faces(unresolved).await?;
                if faces.is_empty() {
                    println!("No faces.");
                }
                for f in faces {
                    let who = match f.assignment.person_id() {
                        Some(id) => format!("person {}", id),
                        None => "unresolved".to_string(),
                    };
                    println!(
                        "{:>6}  {}  [{},{} {}x{}]  {:.2}  {}",
                        f.id,
                        f.path,
                        f.region.x,
                        f.region.y,
                        f.region.width,
                        f.region.height,
                        f.confidence,
                        who
                    );
                }
            }
            FaceAction::Link { face_id, person } => {
                let found = services
                    .index
                    .find_person_by_name(&person)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("person '{}' not found", person.trim()))?;
                services.index.link_face(face_id, found.id).await?;
                println!("Linked face {} to {}", face_id, found.name);
            }
            FaceAction::Unlink { face_id } => {
                services.index.unlink_face(face_id).await?;
                println!("Unlinked face {}", face_id);
            }
        },
        Commands::Search { target } => match target {
            SearchTarget::Person { name } => {
                let matches = services.query.find_by_person(&name).await?;
                if matches.is_empty() {
                    println!("No photos of {}.", name.trim());
                }
                for m in matches {
                    println!(
                        "{}  [{},{} {}x{}]",
                        m.path, m.region.x, m.region.y, m.region.width, m.region.height
                    );
                }
            }
            SearchTarget::Documents { query, k } => {
                let hits = services.query.semantic_search(&query, k).await?;
                if hits.is_empty() {
                    println!("No results.");
                }
                for (i, hit) in hits.iter().enumerate() {
                    println!("{}. [{:.3}] {}", i + 1, hit.score, hit.id);
                    println!("    {}", snippet(&hit.text, 160));
                }
            }
        },
        Commands::Stats => {
            stats::run_stats(&services).await?;
        }
        Commands::Serve => {
            server::run_server(services.clone()).await?;
        }
    }

    services.close().await;
    Ok(())
}

fn roots_or_configured(roots: Vec<PathBuf>, pipeline: Pipeline, cfg: &Config) -> Vec<PathBuf> {
    if !roots.is_empty() {
        return roots;
    }
    match pipeline {
        Pipeline::Images => cfg.scan.image_roots.clone(),
        Pipeline::Documents => cfg.scan.document_roots.clone(),
    }
}

fn print_report(pipeline: Pipeline, report: &ScanReport) {
    println!(
        "Scanned {}: {} indexed, {} unchanged, {} failed ({} seen)",
        pipeline,
        report.indexed_count,
        report.skipped_count,
        report.failures.len(),
        report.seen_count
    );
    for failure in &report.failures {
        println!(
            "  FAILED [{:?}] {}: {}",
            failure.kind,
            failure.path.display(),
            failure.message
        );
    }
    if report.cancelled {
        println!("Scan cancelled before completion.");
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}…", cut)
    }
}
