//! Command-line interface for the Shoebox photo archive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use shoebox_core::config::AppConfig;
use shoebox_core::rendition::file_type_from_name;
use shoebox_core::RenditionClass;
use shoebox_pipeline::{
    parse_id_ranges, IngestOptions, Ingestor, LocalArchive, Publisher, ReconcileOptions,
    Reconciler, Selection, SourcePreference,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "shoebox")]
#[command(about = "Content-addressed photo archive and publication pipeline")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "SHOEBOX_CONFIG", default_value = "shoebox.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import photos into the archive and publish them
    Import {
        /// Files or directories to import
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Archive and derive locally without publishing
        #[arg(long)]
        no_upload: bool,

        /// Regenerate renditions that already exist
        #[arg(long)]
        regenerate: bool,

        /// Label recorded as the import batch source (defaults to hostname)
        #[arg(long)]
        source: Option<String>,
    },
    /// Regenerate missing renditions and publish the new ones
    Reprocess {
        /// Process every cataloged photo
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        /// Photo ids, e.g. "1,5,10-20"
        #[arg(long)]
        ids: Option<String>,

        /// Rendition classes to generate
        #[arg(long, default_value = "t,m,n,k,c,b")]
        sizes: String,

        /// Derivation source: "original" or a rendition code
        #[arg(long, default_value = "original")]
        source: String,

        /// JPEG quality override (defaults to archive.jpeg_quality)
        #[arg(long)]
        quality: Option<u8>,

        /// Report decisions without writing or transferring anything
        #[arg(long)]
        dry_run: bool,

        /// Regenerate renditions that already exist
        #[arg(long)]
        force: bool,

        /// Delete artifacts fetched from the remote store afterwards
        #[arg(long)]
        cleanup: bool,

        /// Parallel workers across photos
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Correct remote access tiers without re-uploading content
    UpdateTiers {
        /// Process every cataloged photo
        #[arg(long, conflicts_with = "ids")]
        all: bool,

        /// Photo ids, e.g. "1,5,10-20"
        #[arg(long)]
        ids: Option<String>,

        /// Rendition classes to correct
        #[arg(long, default_value = "t,m,n,k,c,b")]
        sizes: String,

        /// Leave the archived originals' tier untouched
        #[arg(long)]
        skip_original: bool,

        /// Report what would change without touching the remote store
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let store = shoebox_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    let metadata = shoebox_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata store")?;

    let archive = LocalArchive::new(&config.archive.root);
    let publisher = Publisher::new(store);
    let reconciler = Reconciler::new(archive.clone(), publisher.clone(), metadata.clone());
    let ingestor = Ingestor::new(
        archive,
        publisher,
        metadata,
        config.archive.jpeg_quality,
    );

    match cli.command {
        Commands::Import {
            paths,
            no_upload,
            regenerate,
            source,
        } => {
            let opts = IngestOptions {
                upload: !no_upload,
                regenerate,
                import_source: source,
            };
            run_import(&ingestor, &paths, &opts).await
        }
        Commands::Reprocess {
            all,
            ids,
            sizes,
            source,
            quality,
            dry_run,
            force,
            cleanup,
            workers,
        } => {
            let selection = parse_selection(all, ids.as_deref())?;
            let mut sizes = parse_sizes(&sizes)?;
            let source = match source.as_str() {
                "original" => SourcePreference::Original,
                code => {
                    let class = RenditionClass::by_code(code)
                        .context("unknown source rendition class")?;
                    // Generating the source class from itself is pointless.
                    sizes.retain(|c| c.code != class.code);
                    SourcePreference::Rendition(class.code)
                }
            };
            let opts = ReconcileOptions {
                sizes,
                source,
                quality: quality.unwrap_or(config.archive.jpeg_quality),
                dry_run,
                force,
                cleanup,
                workers,
            };

            let summary = reconciler.reconcile(&selection, &opts).await?;
            println!(
                "{} photos: {} ok, {} failed; {} generated, {} skipped, {} uploaded, {} fetched in {:.1}s ({:.1} photos/s){}",
                summary.photos,
                summary.succeeded,
                summary.failed,
                summary.generated,
                summary.skipped,
                summary.uploaded,
                summary.fetched,
                summary.elapsed.as_secs_f64(),
                summary.throughput(),
                if dry_run { " [dry run]" } else { "" },
            );
            if summary.failed > 0 {
                anyhow::bail!("{} photos failed", summary.failed);
            }
            Ok(())
        }
        Commands::UpdateTiers {
            all,
            ids,
            sizes,
            skip_original,
            dry_run,
        } => {
            let selection = parse_selection(all, ids.as_deref())?;
            let sizes = parse_sizes(&sizes)?;

            let summary = reconciler
                .update_tiers(&selection, &sizes, !skip_original, dry_run)
                .await?;
            println!(
                "{} objects examined: {} updated, {} missing, {} failed in {:.1}s{}",
                summary.examined,
                summary.updated,
                summary.missing,
                summary.failed,
                summary.elapsed.as_secs_f64(),
                if dry_run { " [dry run]" } else { "" },
            );
            if summary.failed > 0 {
                anyhow::bail!("{} tier updates failed", summary.failed);
            }
            Ok(())
        }
    }
}

fn load_config(path: &str) -> Result<AppConfig> {
    let config_path = Path::new(path);
    let mut figment = Figment::new();
    if config_path.exists() {
        tracing::info!(config_path = %path, "loading configuration from file");
        figment = figment.merge(Toml::file(path));
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("SHOEBOX_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

async fn run_import(ingestor: &Ingestor, paths: &[PathBuf], opts: &IngestOptions) -> Result<()> {
    let files = collect_image_files(paths)?;
    if files.is_empty() {
        anyhow::bail!("no image files found in the given paths");
    }

    let mut ok = 0usize;
    let mut failed = 0usize;
    for file in &files {
        match ingestor.ingest_file(file, opts).await {
            Ok(report) => {
                ok += 1;
                let rendition_failures =
                    report.renditions.iter().filter(|r| r.result.is_err()).count();
                let upload_failures =
                    report.uploads.iter().filter(|u| u.result.is_err()).count();
                if rendition_failures + upload_failures > 0 {
                    tracing::warn!(
                        path = %file.display(),
                        photo_id = report.photo_id,
                        rendition_failures,
                        upload_failures,
                        "imported with partial failures"
                    );
                } else {
                    tracing::info!(
                        path = %file.display(),
                        photo_id = report.photo_id,
                        digest = %report.digest,
                        published = report.published,
                        "imported"
                    );
                }
            }
            Err(e) => {
                failed += 1;
                tracing::error!(path = %file.display(), error = %e, "import failed");
            }
        }
    }

    println!("{} files imported, {} failed", ok, failed);
    if failed > 0 {
        anyhow::bail!("{} imports failed", failed);
    }
    Ok(())
}

/// Expand files and directories into a sorted list of image files.
fn collect_image_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk_dir(path, &mut files)
                .with_context(|| format!("cannot read directory {}", path.display()))?;
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, files)?;
        } else if is_image_file(&path) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(file_type_from_name)
        .map(|ext| {
            matches!(
                ext.as_str(),
                "jpg" | "jpeg" | "png" | "gif" | "tif" | "tiff" | "webp" | "bmp"
            )
        })
        .unwrap_or(false)
}

fn parse_selection(all: bool, ids: Option<&str>) -> Result<Selection> {
    match (all, ids) {
        (true, None) => Ok(Selection::All),
        (false, Some(spec)) => Ok(Selection::Ids(parse_id_ranges(spec)?)),
        _ => anyhow::bail!("exactly one of --all or --ids is required"),
    }
}

fn parse_sizes(spec: &str) -> Result<Vec<&'static RenditionClass>> {
    let mut classes = Vec::new();
    for code in spec.split(',') {
        let code = code.trim();
        if code.is_empty() {
            continue;
        }
        classes.push(
            RenditionClass::by_code(code)
                .with_context(|| format!("unknown rendition class '{code}'"))?,
        );
    }
    if classes.is_empty() {
        anyhow::bail!("no rendition classes given");
    }
    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sizes() {
        let classes = parse_sizes("t,m,b").unwrap();
        let codes: Vec<&str> = classes.iter().map(|c| c.code).collect();
        assert_eq!(codes, vec!["t", "m", "b"]);

        assert!(parse_sizes("t,xl").is_err());
        assert!(parse_sizes("").is_err());
    }

    #[test]
    fn test_parse_selection() {
        assert!(matches!(
            parse_selection(true, None).unwrap(),
            Selection::All
        ));
        assert!(matches!(
            parse_selection(false, Some("1-3")).unwrap(),
            Selection::Ids(ids) if ids == vec![1, 2, 3]
        ));
        assert!(parse_selection(false, None).is_err());
        assert!(parse_selection(true, Some("1")).is_err());
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("/x/IMG_0001.JPG")));
        assert!(is_image_file(Path::new("scan.tiff")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
