use activity_importer::{BatchStatus, FileImporter, ImportResultSet, ImporterConfig};
use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "activity-import")]
#[command(about = "Imports recorded activities from device and application exports", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse files and archives into canonical activities
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Write one JSON document per activity into this directory
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, env = "IMPORT_QUARANTINE_DIR")]
        quarantine_dir: Option<PathBuf>,

        /// Leave the submitted files in place
        #[arg(long)]
        keep_originals: bool,

        #[arg(long, env = "TTBIN_CONVERTER")]
        ttbin_converter: Option<PathBuf>,

        #[arg(long)]
        max_archive_depth: Option<usize>,
    },
    /// List the file extensions the importer accepts
    Formats,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("activity_import={},activity_importer={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = ImporterConfig::from_env().context("Invalid importer configuration")?;

    match cli.command {
        Commands::Import {
            files,
            output,
            quarantine_dir,
            keep_originals,
            ttbin_converter,
            max_archive_depth,
        } => {
            if quarantine_dir.is_some() {
                config.quarantine_dir = quarantine_dir;
            }
            if ttbin_converter.is_some() {
                config.ttbin_converter = ttbin_converter;
            }
            if let Some(depth) = max_archive_depth {
                config.max_archive_depth = depth;
            }
            config.keep_originals |= keep_originals;

            handle_import(config, &files, output.as_deref())?;
        }
        Commands::Formats => {
            let importer = FileImporter::new(config);
            tracing::info!("Supported file types:");
            for extension in importer.supported_extensions() {
                tracing::info!("  - {}", extension);
            }
        }
    }

    Ok(())
}

fn handle_import(
    config: ImporterConfig,
    files: &[PathBuf],
    output: Option<&Path>,
) -> anyhow::Result<()> {
    tracing::info!("Importing {} file(s)", files.len());
    let importer = FileImporter::new(config);
    let results = importer.import_files(files);

    let succeeded = results.succeeded().count();
    let failed = results.failed().count();
    let activity_count = results.activities().count();

    if let Some(output) = output {
        let written = write_activities(&results, output)?;
        tracing::info!("Wrote {} activit(y/ies) to {}", written, output.display());
    } else {
        tracing::info!("Parsed {} activit(y/ies)", activity_count);
    }

    tracing::info!("Summary: {} succeeded, {} failed", succeeded, failed);

    if results.status() == BatchStatus::Failed {
        bail!("{} file(s) failed to import", failed);
    }

    Ok(())
}

fn write_activities(results: &ImportResultSet, output: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(output)
        .with_context(|| format!("Cannot create output directory {}", output.display()))?;

    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
    let mut written = 0;
    for (index, activity) in results.activities().enumerate() {
        let sport = activity
            .metadata
            .sport
            .map(|s| s.as_str())
            .unwrap_or("unknown");
        let filename = format!("{}_{:03}_{}.json", timestamp, index + 1, sport);
        let filepath = output.join(&filename);

        let json = serde_json::to_string_pretty(activity)?;
        std::fs::write(&filepath, json)
            .with_context(|| format!("Cannot write {}", filepath.display()))?;

        tracing::info!("  ✓ Exported to: {}", filepath.display());
        written += 1;
    }

    Ok(written)
}
