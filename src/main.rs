mod archive;
mod db;
mod fetcher;
mod parser;
mod publish;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "europarl_minutes",
    about = "Dutch European Parliament minutes corpus builder"
)]
struct Cli {
    /// SQLite state database
    #[arg(long, global = true, default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl the minutes archive and queue document URLs
    Init,
    /// Download queued documents
    Fetch {
        /// Max documents to fetch (default: all unvisited)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Extract and clean text from fetched documents
    Process {
        /// Max documents to process (default: all unprocessed)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Fetch + process in one pipeline
    Run {
        /// Max documents to fetch+process
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Merge all records into the on-disk dataset
    Publish {
        /// Dataset directory
        #[arg(short, long, default_value = publish::DEFAULT_DATASET_DIR)]
        out: PathBuf,
    },
    /// Show pipeline statistics
    Stats,
    /// Print the record stored for one document URL
    Show { url: String },
    /// Run extraction on a local XML file and print the cleaned text
    Extract { path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => {
            let conn = open_db(&cli.db)?;
            let urls = archive::fetch_document_urls().await?;
            let inserted = db::insert_documents(&conn, &urls)?;
            println!("Queued {} new document URLs ({} total found)", inserted, urls.len());
            Ok(())
        }
        Commands::Fetch { limit } => {
            let conn = open_db(&cli.db)?;
            let documents = db::fetch_unvisited(&conn, limit)?;
            if documents.is_empty() {
                println!("No unvisited documents. Run 'init' first or all documents are fetched.");
                return Ok(());
            }
            println!("Fetching {} documents (streaming to DB)...", documents.len());
            let stats = fetcher::fetch_documents_streaming(&conn, documents).await?;
            println!(
                "Done: {} fetched ({} ok, {} errors).",
                stats.total, stats.ok, stats.errors
            );
            Ok(())
        }
        Commands::Process { limit } => {
            let conn = open_db(&cli.db)?;
            let documents = db::fetch_unprocessed(&conn, limit)?;
            if documents.is_empty() {
                println!("No unprocessed documents. Run 'fetch' first.");
                return Ok(());
            }
            println!("Processing {} documents...", documents.len());
            let counts = process_documents(&conn, &documents)?;
            counts.print();
            Ok(())
        }
        Commands::Run { limit } => {
            let conn = open_db(&cli.db)?;
            let documents = db::fetch_unvisited(&conn, limit)?;
            if documents.is_empty() {
                println!("No unvisited documents. Run 'init' first.");
                return Ok(());
            }

            // Phase 1: Fetch (streaming to DB)
            let t_fetch = Instant::now();
            println!("Pipeline: fetching {} documents (streaming to DB)...", documents.len());
            let stats = fetcher::fetch_documents_streaming(&conn, documents).await?;
            println!(
                "Fetched {} documents ({} ok, {} errors) in {:.1}s",
                stats.total, stats.ok, stats.errors, t_fetch.elapsed().as_secs_f64()
            );

            // Phase 2: Process
            let t_process = Instant::now();
            let unprocessed = db::fetch_unprocessed(&conn, None)?;
            if unprocessed.is_empty() {
                println!("Nothing to process (all fetched documents had errors).");
                return Ok(());
            }
            println!("Processing {} documents...", unprocessed.len());
            let counts = process_documents(&conn, &unprocessed)?;
            println!("Processed in {:.1}s", t_process.elapsed().as_secs_f64());
            counts.print();
            Ok(())
        }
        Commands::Publish { out } => {
            let conn = open_db(&cli.db)?;
            let records = db::fetch_records(&conn)?;
            if records.is_empty() {
                println!("No records to publish. Run 'process' first.");
                return Ok(());
            }
            let stats = publish::publish_dataset(&out, records)?;
            match stats.version {
                Some(v) => println!(
                    "Published {} v{} to {}: {} new records ({} total).",
                    publish::DATASET_NAME,
                    v,
                    out.display(),
                    stats.added,
                    stats.existing + stats.added
                ),
                None => println!(
                    "No new records since the last publish ({} in dataset).",
                    stats.existing
                ),
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&cli.db)?;
            let s = db::get_stats(&conn)?;
            println!("Total:     {}", s.total);
            println!("Visited:   {}", s.visited);
            println!("Unvisited: {}", s.unvisited);
            println!("Fetched:   {}", s.fetched);
            println!("Errors:    {}", s.errors);
            println!("Records:   {}", s.records);
            println!("Rejected:  {}", s.rejected);
            Ok(())
        }
        Commands::Show { url } => {
            let conn = open_db(&cli.db)?;
            match db::fetch_record(&conn, &url)? {
                Some(r) => {
                    println!("{}\n[{}]\n\n{}", r.url, r.source, r.text);
                    Ok(())
                }
                None => Err(anyhow::anyhow!("No record for {}", url)),
            }
        }
        Commands::Extract { path } => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            match parser::extract(&bytes) {
                Some(text) => {
                    println!("{}", text);
                    Ok(())
                }
                None => Err(anyhow::anyhow!(
                    "No usable narrative text in {}",
                    path.display()
                )),
            }
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn open_db(path: &Path) -> anyhow::Result<rusqlite::Connection> {
    let conn = db::connect(path)?;
    db::init_schema(&conn)?;
    Ok(conn)
}

struct ProcessCounts {
    records: usize,
    rejected: usize,
    duplicates: usize,
}

impl ProcessCounts {
    fn print(&self) {
        println!(
            "Saved {} records, {} rejected, {} duplicate URLs.",
            self.records, self.rejected, self.duplicates,
        );
    }
}

fn process_documents(
    conn: &rusqlite::Connection,
    documents: &[db::StoredDocument],
) -> anyhow::Result<ProcessCounts> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let mut counts = ProcessCounts {
        records: 0,
        rejected: 0,
        duplicates: 0,
    };

    for chunk in documents.chunks(500) {
        let results: Vec<_> = chunk.par_iter().map(parser::process_document).collect();
        let produced = results
            .iter()
            .filter(|r| matches!(r.outcome, parser::Outcome::Record(_)))
            .count();
        let (saved, rejected) = db::save_processed(conn, &results)?;
        counts.records += saved;
        counts.rejected += rejected;
        counts.duplicates += produced - saved;
        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    Ok(counts)
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
