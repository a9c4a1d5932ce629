use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wokharvest::matcher::match_articles;
use wokharvest::papers::{self, Paper};
use wokharvest::report::{print_articles, CitationReport};
use wokharvest::soap::{LiteQuery, RetrieveParams, SearchService, WokSoapClient};
use wokharvest::{Config, IdType, QueryKey};

#[derive(Parser, Debug)]
#[command(name = "wokharvest")]
#[command(version = "0.1.0")]
#[command(about = "Harvest citation counts and bibliographic records from Web of Knowledge", long_about = None)]
struct Args {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up citation counts for every paper in .bib files through the batch API
    Citations {
        /// Input .bib file(s)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Identifier to look papers up by: doi, pmid or ut
        #[arg(long, default_value = "doi")]
        by: IdType,
    },
    /// Search the portal for papers in .bib files by title
    Titles {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Titles OR-ed into a single query
        #[arg(long, default_value_t = 10)]
        per_query: usize,
    },
    /// Search the portal for papers co-authored by two people
    Authors { first: String, second: String },
    /// Run a query against the lite search service and print the raw response
    Lite {
        query: String,

        #[arg(long, default_value_t = 5)]
        count: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("wokharvest=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail(&e.to_string()),
    };

    let result = match args.command {
        Command::Citations { ref files, by } => citations(&config, files, by, args.json).await,
        Command::Titles {
            ref files,
            per_query,
        } => titles(&config, files, per_query.max(1), args.json).await,
        Command::Authors {
            ref first,
            ref second,
        } => authors(&config, first, second, args.json).await,
        Command::Lite { ref query, count } => lite(&config, query, count).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => fail(&message),
    }
}

fn fail(message: &str) -> ExitCode {
    eprintln!("{} {}", "Error:".red().bold(), message);
    ExitCode::FAILURE
}

fn read_papers(files: &[PathBuf]) -> Result<Vec<Paper>, String> {
    let mut all = Vec::new();
    for file in files {
        all.extend(read_file(file)?);
    }
    Ok(all)
}

fn read_file(file: &Path) -> Result<Vec<Paper>, String> {
    if !file.exists() {
        return Err(format!("File not found: {}", file.display()));
    }
    println!("Parsing {}...", file.display().to_string().cyan());
    let papers = papers::parse_bib_file(file)
        .map_err(|e| format!("Failed to parse {}: {}", file.display(), e))?;
    println!("  Found {} entries", papers.len());
    Ok(papers)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

async fn citations(config: &Config, files: &[PathBuf], by: IdType, json: bool) -> Result<(), String> {
    let papers = read_papers(files)?;
    let keys: Vec<QueryKey> = papers
        .iter()
        .filter_map(|p| p.id(by).map(|id| QueryKey::new(by, id)))
        .collect();

    let requests = keys.len().div_ceil(config.lamr.request_limit.max(1));
    let pb = ProgressBar::new(requests as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} requests")
            .map_err(|e| e.to_string())?
            .progress_chars("#>-"),
    );

    let fetcher = wokharvest::lamr_fetcher(config).with_progress(pb.clone());
    let results = fetcher.fetch(&keys, by).await.map_err(|e| e.to_string())?;
    pb.finish_and_clear();

    let report = CitationReport::from_batch(&papers, by, &results);
    if json {
        print_json(&report)
    } else {
        report.print();
        Ok(())
    }
}

async fn titles(config: &Config, files: &[PathBuf], per_query: usize, json: bool) -> Result<(), String> {
    let papers = read_papers(files)?;
    let mut driver = wokharvest::search_driver(config);
    let mut records = Vec::new();

    for chunk in papers.chunks(per_query) {
        match driver.query_for_title(chunk).await {
            Ok(outcome) => records.extend(outcome.records),
            Err(e) => eprintln!("{} {}", "Query failed:".yellow(), e),
        }
    }

    let matches = match_articles(&papers, &records);
    let report = CitationReport::from_matches(&papers, &matches);
    if json {
        print_json(&report)
    } else {
        report.print();
        Ok(())
    }
}

async fn authors(config: &Config, first: &str, second: &str, json: bool) -> Result<(), String> {
    let mut driver = wokharvest::search_driver(config);
    let outcome = driver
        .query_for_author_pair(first, second)
        .await
        .map_err(|e| format!("{} (code {})", e, e.code()))?;

    if json {
        print_json(&outcome)
    } else {
        print_articles(&outcome.records, outcome.pages);
        Ok(())
    }
}

async fn lite(config: &Config, query: &str, count: u32) -> Result<(), String> {
    let mut client = WokSoapClient::new(config.soap.auth_url.clone(), config.soap.search_url.clone());
    client.authenticate().await.map_err(|e| e.to_string())?;

    let params = RetrieveParams {
        count: count.clamp(1, 100),
        ..RetrieveParams::default()
    };
    let result = client.search(&LiteQuery::new(query), &params).await;
    // Close the session even when the search failed.
    let closed = client.close_session().await;

    println!("{}", result.map_err(|e| e.to_string())?);
    closed.map_err(|e| e.to_string())
}
