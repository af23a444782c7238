//! Sift CLI - Query web search APIs with SQL

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datafusion::arrow::util::pretty::print_batches;
use datafusion::prelude::CsvReadOptions;
use sift_annotations::AnnotationWriter;
use sift_core::SearchEngine;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Query web and image search APIs as SQL tables")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print upstream request metrics to stderr when done
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL query and print the results
    ///
    /// Example: sift query "SELECT title, link FROM google_search('rust async') LIMIT 5"
    Query {
        /// SQL text; may call google_search(...) and google_image_search(...)
        sql: String,

        /// Register a CSV file as a table, as NAME=PATH (repeatable)
        #[arg(long = "csv", value_name = "NAME=PATH")]
        csv: Vec<String>,
    },

    /// Write the rows of a SQL query as a search engine annotation file
    ///
    /// The query must return (url_pattern, action [, comment] [, score]).
    Annotate {
        /// SQL text producing the annotation rows
        sql: String,

        /// Output XML path
        #[arg(short, long)]
        output: PathBuf,

        /// Register a CSV file as a table, as NAME=PATH (repeatable)
        #[arg(long = "csv", value_name = "NAME=PATH")]
        csv: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let engine = SearchEngine::from_env().context("failed to configure search engine")?;

    match cli.command {
        Commands::Query { sql, csv } => {
            register_csv_tables(&engine, &csv).await?;
            run_query(&engine, &sql).await?;
        }
        Commands::Annotate { sql, output, csv } => {
            register_csv_tables(&engine, &csv).await?;
            write_annotations(&engine, &sql, &output).await?;
        }
    }

    if cli.metrics {
        eprintln!("{}", engine.metrics().encode_metrics());
    }

    Ok(())
}

async fn register_csv_tables(engine: &SearchEngine, tables: &[String]) -> Result<()> {
    for table in tables {
        let (name, path) = table
            .split_once('=')
            .with_context(|| format!("--csv expects NAME=PATH, got '{}'", table))?;
        engine
            .context()
            .register_csv(name, path, CsvReadOptions::new())
            .await
            .with_context(|| format!("failed to register CSV table '{}' from {}", name, path))?;
        info!("Registered CSV table '{}' from {}", name, path);
    }
    Ok(())
}

async fn run_query(engine: &SearchEngine, sql: &str) -> Result<()> {
    let batches = engine.collect(sql).await?;
    let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
    print_batches(&batches)?;
    info!("{} rows", rows);
    Ok(())
}

async fn write_annotations(engine: &SearchEngine, sql: &str, output: &Path) -> Result<()> {
    let batches = engine.collect(sql).await?;
    let writer = AnnotationWriter::create(output)
        .with_context(|| format!("failed to create {:?}", output))?;
    for batch in &batches {
        writer.write_batch(batch)?;
    }
    let stats = writer.finish()?;
    println!(
        "Wrote {} annotations ({} bytes) to {}",
        stats.annotations,
        stats.bytes,
        output.display()
    );
    Ok(())
}
