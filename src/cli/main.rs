use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use exif_date_from_filename::config::Config;
use exif_date_from_filename::pipeline::{self, BatchReport};
use exif_date_from_filename::policy::MutationDirectives;
use exif_date_from_filename::replace::AtomicReplacer;

#[derive(Parser, Debug)]
#[command(
    name = "exif-date-from-filename",
    version,
    about = "Infer capture dates from photo filenames and folders and write them into EXIF"
)]
struct Cli {
    /// Image files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Parser chain config (YAML)
    #[arg(short, long, value_name = "FILE", default_value = "config.yml")]
    config: PathBuf,

    /// Write a sample config to --config and exit
    #[arg(long)]
    init: bool,

    /// Actually modify files (default is a dry run)
    #[arg(long)]
    wet_run: bool,

    /// Rewrite capture dates written by an earlier run
    #[arg(long)]
    update: bool,

    /// Write even if another program already set a capture date
    #[arg(long)]
    force: bool,

    /// Print the batch report as JSON instead of the updated directories
    #[arg(long)]
    json: bool,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Warnings only, with a progress bar
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            _ => "trace",
        }
    }

    fn directives(&self) -> MutationDirectives {
        MutationDirectives {
            dry_run: !self.wet_run,
            allow_update: self.update,
            force: self.force,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        Config::default().save(&cli.config)?;
        println!("Sample config written to {}", cli.config.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Any config problem stops the run before a file is touched
    let chain = Config::load_chain(&cli.config)?;
    let directives = cli.directives();

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }

    log::info!("Found {} image(s) to process", images.len());
    if directives.dry_run {
        log::info!("DRY RUN: no files will be modified, pass --wet-run to write");
    }

    let progress = if cli.quiet {
        let pb = ProgressBar::new(images.len() as u64);
        pb.set_style(ProgressStyle::with_template("[{bar:40}] {pos}/{len} {wide_msg}")?);
        Some(pb)
    } else {
        None
    };

    let replacer = AtomicReplacer::default();
    let report = pipeline::process_images(&images, &chain, &directives, &replacer, |path, _| {
        if let Some(pb) = &progress {
            pb.set_message(path.display().to_string());
            pb.inc(1);
        }
    });
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    log::info!("Done!");
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_updated_dirs(&report);
    }
    log_summary(&report);

    Ok(())
}

fn print_updated_dirs(report: &BatchReport) {
    if report.updated_dirs.is_empty() {
        log::info!("No directories were updated.");
        return;
    }
    log::info!("Dumping updated directories to stdout");
    for dir in &report.updated_dirs {
        println!("{}", dir.display());
    }
}

fn log_summary(report: &BatchReport) {
    log::info!(
        "{} file(s): {} updated, {} would update, {} already set, {} without date, {} unreadable, {} failed",
        report.processed,
        report.updated,
        report.would_update,
        report.already_set,
        report.no_date,
        report.unreadable,
        report.failed
    );
    if report.failed > 0 {
        log::warn!("{} file(s) could not be updated, see warnings above", report.failed);
    }
}
