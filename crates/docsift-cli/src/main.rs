//! CLI entry point for docsift: build an index from extracted pages, search it, export it.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use docsift_core::{
    artifact_key, load_blocks, load_config, report_file_name, status, ArtifactStore, Config,
    OllamaEmbedder, SearchError, SearchMode, SearchService,
};
use tracing_subscriber::EnvFilter;

type CliResult = Result<ExitCode, Box<dyn Error>>;

/// Exit code for a key with no (complete) artifact.
const EXIT_NOT_FOUND: u8 = 2;

#[derive(Parser)]
#[command(name = "docsift")]
#[command(about = "docsift: chunk, embed and search extracted documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show backend status (for dev).
    Status,
    /// Show where docsift stores its config and processed documents.
    DataDir,
    /// Print the effective configuration.
    Config,
    /// Chunk, embed and index extracted pages, replacing any existing index for the key.
    Build {
        /// Extracted pages: a JSON list of {page, text} or text with form-feed page breaks.
        #[arg(value_name = "PATH")]
        path: PathBuf,
        /// Artifact key. Defaults to the file name without its extension.
        #[arg(long)]
        key: Option<String>,
    },
    /// Search a processed document.
    Search {
        key: String,
        query: String,
        /// `semantic` (vector similarity) or `keyword` (case-insensitive substring match).
        #[arg(long = "type", value_name = "TYPE", default_value = "semantic")]
        mode: String,
        /// Number of semantic results (default from config).
        #[arg(short)]
        k: Option<usize>,
    },
    /// Export a processed document's chunks as CSV (Page, Content).
    Export {
        key: String,
        /// Output file. Defaults to `<key>_report.csv`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config();

    let result = match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            println!("docsift backend");
            println!("  core: {}", status());
            Ok(ExitCode::SUCCESS)
        }
        Commands::DataDir => data_dir(&config),
        Commands::Config => print_config(&config),
        Commands::Build { path, key } => build(&config, &path, key),
        Commands::Search {
            key,
            query,
            mode,
            k,
        } => search(&config, &key, &query, &mode, k),
        Commands::Export { key, out } => export(&config, &key, out),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn service(config: &Config) -> Result<SearchService<OllamaEmbedder>, Box<dyn Error>> {
    let store = ArtifactStore::new(config.processed_dir()?);
    let embedder = OllamaEmbedder::from_url(config.ollama_url())?.with_embed_model(config.embed_model());
    Ok(SearchService::new(store, embedder, config.chunk_options()?))
}

fn data_dir(config: &Config) -> CliResult {
    match docsift_core::app_data_dir() {
        Some(p) => println!("{}", p.display()),
        None => eprintln!("Could not determine app data directory."),
    }
    println!("processed: {}", config.processed_dir()?.display());
    Ok(ExitCode::SUCCESS)
}

fn print_config(config: &Config) -> CliResult {
    let options = config.chunk_options()?;
    println!("processed_dir={}", config.processed_dir()?.display());
    println!("chunk_size={}", options.size());
    println!("chunk_overlap={}", options.overlap());
    println!("top_k={}", config.top_k());
    println!("ollama_url={}", config.ollama_url());
    println!("embed_model={}", config.embed_model());
    Ok(ExitCode::SUCCESS)
}

fn build(config: &Config, path: &Path, key: Option<String>) -> CliResult {
    let key = match key {
        Some(k) => k,
        None => path
            .file_name()
            .and_then(|n| artifact_key(&n.to_string_lossy()))
            .ok_or_else(|| format!("cannot derive a key from {}; pass --key", path.display()))?,
    };
    let blocks = load_blocks(path)?;
    let summary = service(config)?.build_and_persist(&blocks, &key)?;
    println!(
        "Indexed {} chunk(s) from {} page block(s) as {:?} (dimension {})",
        summary.chunks,
        blocks.len(),
        summary.key,
        summary.dimension
    );
    Ok(ExitCode::SUCCESS)
}

fn search(config: &Config, key: &str, query: &str, mode: &str, k: Option<usize>) -> CliResult {
    let mode: SearchMode = mode.parse()?;
    let k = k.unwrap_or_else(|| config.top_k());
    match service(config)?.search(query, key, mode, k) {
        Ok(results) => {
            println!("{}", serde_json::json!({ "results": results }));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => not_found_or(e),
    }
}

fn export(config: &Config, key: &str, out: Option<PathBuf>) -> CliResult {
    let bytes = match service(config)?.export_csv(key) {
        Ok(bytes) => bytes,
        Err(e) => return not_found_or(e),
    };
    let out = out.unwrap_or_else(|| PathBuf::from(report_file_name(key)));
    std::fs::write(&out, bytes)?;
    println!("Wrote {}", out.display());
    Ok(ExitCode::SUCCESS)
}

fn not_found_or(e: SearchError) -> CliResult {
    if e.is_not_found() {
        eprintln!("Data not found: {e}");
        Ok(ExitCode::from(EXIT_NOT_FOUND))
    } else {
        Err(e.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_type_defaults_to_semantic() {
        let cli = Cli::try_parse_from(["docsift", "search", "report", "tax rates"]).unwrap();
        let Some(Commands::Search { mode, k, .. }) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(mode.parse::<SearchMode>().unwrap(), SearchMode::Semantic);
        assert_eq!(k, None);
    }

    #[test]
    fn search_type_flag_selects_keyword() {
        let cli = Cli::try_parse_from([
            "docsift", "search", "report", "tax", "--type", "keyword", "-k", "3",
        ])
        .unwrap();
        let Some(Commands::Search { key, query, mode, k }) = cli.command else {
            panic!("expected search command");
        };
        assert_eq!((key.as_str(), query.as_str()), ("report", "tax"));
        assert_eq!(mode.parse::<SearchMode>().unwrap(), SearchMode::Keyword);
        assert_eq!(k, Some(3));
    }

    #[test]
    fn unknown_search_type_is_an_error() {
        let config = Config {
            processed_dir: Some(std::env::temp_dir().to_string_lossy().into_owned()),
            ..Config::default()
        };
        let err = search(&config, "report", "tax", "fuzzy", None).unwrap_err();
        assert!(err.to_string().contains("unknown search mode"));
    }
}
