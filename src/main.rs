use std::{io::Write, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use toolsmith::{
    build_toolchain,
    config::{Overrides, Settings, resolve_config},
    load_registry,
    registry::show,
};

/// Build a bare-metal cross toolchain from source.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Directory holding sources, logs and completion markers [default: build]
    #[arg(short, long)]
    build_dir: Option<PathBuf>,
    /// Install prefix of the toolchain [default: build/output]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// `all` or a comma separated list of components [default: all]
    #[arg(short, long)]
    components: Option<String>,
    /// List the available components and exit
    #[arg(short, long, default_value_t = false)]
    show_components: bool,
    /// Don't verify the SHA256 of downloaded archives
    #[arg(short = 'n', long, default_value_t = false)]
    no_verify: bool,
    /// Directory with one subdirectory of patches per component [default: patches]
    #[arg(short, long)]
    patches_dir: Option<PathBuf>,
    /// Directory with additional TOML recipes [default: recipes]
    #[arg(short, long)]
    recipes_dir: Option<PathBuf>,
    /// The number of jobs passed to make
    #[arg(short, long)]
    jobs: Option<u64>,
    /// Target triple [default: arm-none-eabi]
    #[arg(short, long)]
    target: Option<String>,
    /// Keep debug symbols in the installed executables
    #[arg(long, default_value_t = false)]
    no_strip: bool,
}

impl From<&Cli> for Overrides {
    fn from(cli: &Cli) -> Self {
        Overrides {
            build_dir: cli.build_dir.clone(),
            output_dir: cli.output_dir.clone(),
            patches_dir: cli.patches_dir.clone(),
            recipes_dir: cli.recipes_dir.clone(),
            target: cli.target.clone(),
            jobs: cli.jobs,
            components: cli.components.clone(),
            no_verify: cli.no_verify,
            no_strip: cli.no_strip,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .format(|buf, record| {
            let warn_style = buf.default_level_style(log::Level::Warn);
            match record.level() {
                log::Level::Info => {
                    writeln!(buf, "{}", record.args())
                }
                _ => {
                    writeln!(buf, "{warn_style}{}{warn_style:#}", record.args())
                }
            }
        })
        .init();

    let config = resolve_config()?;
    log::debug!("{config:?}");
    let settings = Settings::resolve(config.into(), Overrides::from(&cli))?;

    if cli.show_components {
        let registry = load_registry(&settings)?;
        print!("{}", show(&registry.names()));
        return Ok(());
    }

    let report = build_toolchain(&settings)?;

    if report.built.is_empty() {
        println!("{}", "Nothing to do, everything is built".green());
    } else {
        println!(
            "{} {}",
            "Built:".green().bold(),
            report.built.join(", ").bold()
        );
    }
    if !report.skipped.is_empty() {
        println!("{} {}", "Already built:".dimmed(), report.skipped.join(", "));
    }

    Ok(())
}
