//! `kidsafe`: index the labeling guide, try retrieval strategies and analyze
//! cereal ingredients from the terminal.

mod args;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use kidsafe_analyzer::{load_corpus, AnalysisReport, AppContext, FollowUp, OpenAiChat, Verdict};
use kidsafe_core::config::{Config, Settings};
use kidsafe_core::logging::init_tracing;
use kidsafe_core::traits::{ChatModel, Retriever};
use kidsafe_core::types::{Availability, ScoredChunk, StrategyKind};
use kidsafe_retrieval::{RetrievalManager, RunOutcome};

use crate::args::{Cli, Command, USAGE};

fn main() -> Result<()> {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    if argv.is_empty() || argv.iter().any(|a| a == "-h" || a == "--help") {
        println!("{USAGE}");
        return Ok(());
    }
    let cli = match args::parse(&argv) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("❌ {e}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    init_tracing();
    let settings = load_settings(&cli).map_err(|e| {
        eprintln!("❌ Failed to load configuration: {e:#}");
        e
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli, settings))
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Config::load()?.settings()?;
    if let Some(source) = &cli.source { settings.source.path = source.clone(); }
    if let Some(k) = cli.k { settings.retrieval.k = k; }
    settings.validate()?;
    Ok(settings)
}

async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Command::Index => index(settings).await,
        Command::Retrieve { strategy, query } => retrieve(settings, strategy, &query, cli.json).await,
        Command::Compare { query } => compare(settings, &query, cli.json).await,
        Command::Analyze { product, ingredients } => analyze(settings, &product, &ingredients, cli.json).await,
        Command::Chat { product, ingredients, analysis_file, question } => {
            let previous_analysis = std::fs::read_to_string(&analysis_file).with_context(|| format!("Failed to read {analysis_file}"))?;
            let ctx = AppContext::new(settings);
            ctx.initialize(true).await?;
            let req = FollowUp { product, ingredients, previous_analysis, history: Vec::new(), question };
            let answer = ctx.analyzer().await?.follow_up(&req).await?;
            println!("{answer}");
            Ok(())
        }
    }
}

async fn manager(settings: Settings) -> Result<RetrievalManager> {
    let chat: Option<Arc<dyn ChatModel>> = OpenAiChat::from_settings(&settings)?.map(|c| Arc::new(c) as Arc<dyn ChatModel>);
    let corpus = Arc::new(load_corpus(&settings.source).await?);
    Ok(RetrievalManager::from_settings(settings, corpus, chat)?.with_progress(true))
}

async fn index(settings: Settings) -> Result<()> {
    println!("📁 Source: {}", settings.source.path);
    println!("🧩 Chunking: size {} / overlap {}", settings.source.chunk_size, settings.source.chunk_overlap);
    let start = Instant::now();
    let manager = manager(settings).await?;
    let corpus = manager.corpus();
    println!("📄 {} pages, {} chunks", corpus.pages().len(), corpus.len());

    for kind in [StrategyKind::Sparse, StrategyKind::Dense, StrategyKind::ParentChild] {
        if manager.strategy(kind).await?.is_available() {
            println!("✅ {kind} index ready");
        }
    }
    println!("⏱️  Indexed in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

async fn retrieve(settings: Settings, kind: StrategyKind, query: &str, json: bool) -> Result<()> {
    let k = settings.retrieval.k;
    let manager = manager(settings).await?;
    let retriever = match manager.strategy(kind).await? {
        Availability::Available(retriever) => retriever,
        Availability::Unavailable { reason } => {
            eprintln!("⚠️  {kind} is unavailable: {reason}");
            std::process::exit(1);
        }
    };
    let chunks = retriever.retrieve(query, k).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
    } else {
        println!("🔍 {kind}: {} results for {query:?}", chunks.len());
        print_chunks(&chunks);
    }
    Ok(())
}

async fn compare(settings: Settings, query: &str, json: bool) -> Result<()> {
    let k = settings.retrieval.k;
    let manager = manager(settings).await?;
    let runs = manager.compare(query, k).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    for run in &runs {
        match &run.outcome {
            RunOutcome::Ok { elapsed_ms, chunks } => {
                println!("\n✅ {} ({} results, {} ms)", run.kind, chunks.len(), elapsed_ms);
                print_chunks(chunks);
            }
            RunOutcome::Unavailable { reason } => println!("\n⚠️  {} unavailable: {}", run.kind, reason),
            RunOutcome::Failed { error } => println!("\n❌ {} failed: {}", run.kind, error),
        }
    }
    Ok(())
}

async fn analyze(settings: Settings, product: &str, ingredients: &str, json: bool) -> Result<()> {
    let ctx = AppContext::new(settings);
    ctx.initialize(true).await?;
    let report = ctx.analyzer().await?.analyze(product, ingredients).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    let badge = match report.verdict {
        Verdict::Good => "🟢",
        Verdict::Moderate => "🟡",
        Verdict::Bad => "🔴",
    };
    println!("{badge} {}: {}", report.product, report.verdict);
    println!("   strategy: {}\n", report.strategy);
    println!("{}\n", report.analysis);
    println!("📚 Sources:");
    for (i, s) in report.sources.iter().enumerate() {
        println!("  {}. {} p.{} ({:.3})", i + 1, source_name(&s.chunk.source), s.chunk.page, s.score);
    }
}

fn print_chunks(chunks: &[ScoredChunk]) {
    for (i, s) in chunks.iter().enumerate() {
        let preview: String = s.content().chars().take(160).collect();
        println!("  {}. [{:.4}] {} p.{}", i + 1, s.score, s.id(), s.chunk.page);
        println!("     {}", preview.replace('\n', " "));
    }
}

fn source_name(source: &str) -> &str {
    Path::new(source).file_name().and_then(|s| s.to_str()).unwrap_or(source)
}
