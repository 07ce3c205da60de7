use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use shoremap::pipeline::RunReport;
use shoremap::{CancelToken, SiteRun};

#[derive(Parser)]
#[command(name = "shoremap")]
#[command(about = "Rectify coastal camera photos and extract shoreline positions")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report which site inputs are present
    Status {
        #[arg(value_name = "SITE")]
        site: PathBuf,
    },
    /// Align raw photos to the control photo
    Align {
        #[arg(value_name = "SITE")]
        site: PathBuf,
    },
    /// Solve the camera pose from the GCP picks
    Solve {
        #[arg(value_name = "SITE")]
        site: PathBuf,
    },
    /// Rectify aligned photos onto the world grid
    Rectify {
        #[arg(value_name = "SITE")]
        site: PathBuf,
    },
    /// Extract shorelines from rectified rasters
    Shoreline {
        #[arg(value_name = "SITE")]
        site: PathBuf,

        /// Mark new shoreline records as approved
        #[arg(long)]
        approved: bool,
    },
    /// Run every stage in order
    Run {
        #[arg(value_name = "SITE")]
        site: PathBuf,

        /// Stop after rectification
        #[arg(long)]
        skip_shoreline: bool,

        /// Mark new shoreline records as approved
        #[arg(long)]
        approved: bool,

        /// Save debug outputs to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("Received interrupt, finishing the current photo");
        handler_token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let site_run = |site: PathBuf| {
        SiteRun::new(site)
            .with_verbose(args.verbose)
            .with_cancel(cancel.clone())
    };

    let mut report = RunReport::default();
    match args.command {
        Command::Status { site } => {
            let run = site_run(site);
            let status = run.layout().status()?;
            println!("{}", status);
            if !status.is_ready() {
                println!("\nMissing: {}", status.missing().join(", "));
            }
            return Ok(());
        }
        Command::Align { site } => {
            let run = site_run(site);
            let calibration = run.load_site()?;
            run.align(&calibration, &mut report)?;
        }
        Command::Solve { site } => {
            let run = site_run(site);
            let calibration = run.load_site()?;
            let record = run.solve(&calibration)?;
            println!(
                "fx={:.0} azimuth={:.3}° tilt={:.3}° roll={:.3}°",
                record.fx,
                record.angles[0].to_degrees(),
                record.angles[1].to_degrees(),
                record.angles[2].to_degrees()
            );
            return Ok(());
        }
        Command::Rectify { site } => {
            let run = site_run(site);
            let calibration = run.load_site()?;
            let record = run.solve(&calibration)?;
            run.rectify(&record, &mut report)?;
        }
        Command::Shoreline { site, approved } => {
            let run = site_run(site).with_approved(approved);
            let calibration = run.load_site()?;
            let record = run.solve(&calibration)?;
            run.extract(&calibration, &record, &mut report)?;
        }
        Command::Run {
            site,
            skip_shoreline,
            approved,
            debug_out,
        } => {
            let mut run = site_run(site)
                .with_approved(approved)
                .with_skip_shoreline(skip_shoreline);
            if let Some(debug_dir) = debug_out {
                run = run.with_debug(debug_dir)?;
            }
            if args.verbose {
                println!("Running site {}...\n", run.layout().root().display());
            }
            report = run.run()?;
        }
    }

    report.print_summary();
    Ok(())
}
