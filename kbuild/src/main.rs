use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use env_logger::Builder as LogBuilder;
use log::{LevelFilter, debug, info};

use kbuild::error::EXIT_INTERNAL;
use kbuild::pipeline::check_all_tools;
use kbuild::{BuildConfig, BuildError, ConfigOverrides, Outcome, Pipeline, SystemRunner, Target};

/// Build the kernel image, boot it under QEMU, or clean the build tree.
///
/// Tools and flags can also be set through the environment:
/// AS, CC, LD, QEMU, BASE_CFLAGS, DEBUG_CFLAGS, LDFLAGS, ASMFLAGS,
/// EXTRA_CFLAGS and QEMU_OPTS. Command-line options take precedence.
#[derive(Parser, Debug)]
#[command(name = "kbuild", version, about)]
struct Args {
    /// Target to run
    #[arg(value_enum, default_value_t = Target::All)]
    target: Target,

    /// Additional C compiler flags (overrides EXTRA_CFLAGS)
    #[arg(long, short = 'e', allow_hyphen_values = true)]
    extra: Option<String>,

    /// Do not look the tools up in PATH before building
    #[arg(long)]
    no_check_tools: bool,

    /// Project root; tools run here and build/ is created beneath it
    #[arg(long, short = 'C', default_value = ".")]
    directory: PathBuf,

    /// Assembler executable
    #[arg(long = "as", value_name = "EXE")]
    assembler: Option<String>,

    /// C compiler executable
    #[arg(long = "cc", value_name = "EXE")]
    compiler: Option<String>,

    /// Linker executable
    #[arg(long = "ld", value_name = "EXE")]
    linker: Option<String>,

    /// Emulator executable
    #[arg(long = "qemu", value_name = "EXE")]
    emulator: Option<String>,

    /// Extra emulator options (overrides QEMU_OPTS)
    #[arg(long, allow_hyphen_values = true)]
    qemu_opts: Option<String>,

    /// More log output (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only warnings and errors
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            assembler: self.assembler.clone(),
            compiler: self.compiler.clone(),
            linker: self.linker.clone(),
            emulator: self.emulator.clone(),
            extra_cflags: self.extra.clone(),
            emulator_opts: self.qemu_opts.clone(),
            ..Default::default()
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    initialize_logging(args.verbose, args.quiet);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("[ERROR] {err:#}");
            let code = err
                .downcast_ref::<BuildError>()
                .map(BuildError::exit_code)
                .unwrap_or(EXIT_INTERNAL);
            ExitCode::from(code)
        }
    }
}

fn initialize_logging(verbosity: u8, quiet: bool) {
    let level = match (quiet, verbosity) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    LogBuilder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(args: &Args) -> AnyhowResult<()> {
    let config = BuildConfig::from_env(args.overrides());
    let target = args.target;
    debug!("resolved configuration: {config:?}");

    if !args.no_check_tools {
        let missing = check_all_tools(&config);
        if missing > 0 {
            debug!("{missing} tool(s) not found in PATH");
        }
    }

    let pipeline = Pipeline::new(&config, SystemRunner)
        .with_root(&args.directory)
        .check_tools(!args.no_check_tools);
    let outcome = pipeline
        .execute(target)
        .with_context(|| format!("target '{target}' failed"))?;

    match outcome {
        Outcome::Built { image, emulator_ok } => {
            info!("{target}: done, image at {}", image.display());
            if emulator_ok == Some(false) {
                info!("emulator exited with an error; the build itself succeeded");
            }
        }
        Outcome::Cleaned => info!("clean: build tree removed"),
        Outcome::AlreadyClean => info!("clean: nothing to do"),
    }
    Ok(())
}
