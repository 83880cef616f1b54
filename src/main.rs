//! stax - OpenStax collection importer

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use stax::{
    ArchiveSource, EntityKind, Host, HostError, ImportOptions, ImportResult, MediaKind, run_import,
};

#[derive(Parser)]
#[command(name = "stax")]
#[command(version, about = "OpenStax collection importer", long_about = None)]
#[command(after_help = "EXAMPLES:
    stax biology.zip --out ./book             Import a local collection
    stax https://cnx.org/content/col11448.zip --out ./book --timeout 5400
    stax biology.zip --out ./book --json      Machine-readable summary")]
struct Cli {
    /// Collection source: a local ZIP file or a URL
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Output directory for media files and book.json
    #[arg(short, long, value_name = "DIR")]
    out: PathBuf,

    /// Fail on the first condition that would otherwise be a warning
    #[arg(long)]
    strict: bool,

    /// Drop part markers for parts with a single child
    #[arg(long)]
    flatten: bool,

    /// Remote fetch timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 5400)]
    timeout: u64,

    /// Print the import summary as JSON
    #[arg(long)]
    json: bool,

    /// Suppress log output and the human summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let host = DirHost::new(&cli.out).map_err(|e| format!("cannot create output directory: {e}"))?;
    let options = ImportOptions {
        timeout: Duration::from_secs(cli.timeout),
        strict: cli.strict,
        flatten_single_parts: cli.flatten,
        ..ImportOptions::default()
    };
    let source = ArchiveSource::detect(&cli.source);

    let result = run_import(&source, &host, &options).map_err(|e| e.to_string())?;

    if cli.json {
        let summary = serde_json::json!({
            "title": result.title,
            "license": result.license,
            "metadata": result.metadata,
            "entities": result.entities.len(),
            "warnings": result.warnings,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?
        );
    } else if !cli.quiet {
        println!("Imported: {}", result.title);
        if let Some(license) = &result.license {
            println!("License: {license}");
        }
        let chapters = result
            .entities
            .iter()
            .filter(|e| e.kind == EntityKind::Chapter)
            .count();
        println!("Entities: {} ({chapters} chapters)", result.entities.len());
        println!("Output: {}", cli.out.display());
        if !result.warnings.is_empty() {
            println!("Warnings:");
            for warning in &result.warnings {
                println!("  - {warning}");
            }
        }
    }
    Ok(())
}

/// A filesystem-backed host: media lands under `<out>/media/` named by
/// content hash, and the assembled book is written to `<out>/book.json`.
struct DirHost {
    out: PathBuf,
    media_dir: PathBuf,
}

impl DirHost {
    fn new(out: &Path) -> std::io::Result<Self> {
        let media_dir = out.join("media");
        std::fs::create_dir_all(&media_dir)?;
        Ok(DirHost {
            out: out.to_path_buf(),
            media_dir,
        })
    }
}

impl Host for DirHost {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HostError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HostError::Network(e.to_string()))?;
        let response = client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(classify)?;
        let bytes = response.bytes().map_err(classify)?;
        Ok(bytes.to_vec())
    }

    fn persist_media(
        &self,
        bytes: &[u8],
        _kind: MediaKind,
        origin: &str,
    ) -> Result<String, HostError> {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(bytes);
        let ext = Path::new(origin)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let name = format!("{}.{ext}", hasher.digest());
        let path = self.media_dir.join(&name);
        if !path.exists() {
            std::fs::write(&path, bytes).map_err(|e| HostError::Storage(e.to_string()))?;
        }
        Ok(format!("media/{name}"))
    }

    fn emit_entities(&self, result: &ImportResult) -> Result<(), HostError> {
        let file = std::fs::File::create(self.out.join("book.json"))
            .map_err(|e| HostError::Storage(e.to_string()))?;
        serde_json::to_writer_pretty(file, result).map_err(|e| HostError::Rejected(e.to_string()))
    }
}

fn classify(e: reqwest::Error) -> HostError {
    if e.is_timeout() {
        HostError::Timeout
    } else {
        HostError::Network(e.to_string())
    }
}
