pub mod cli;
pub mod error;
pub mod model;
pub mod parser;
pub mod processor;
pub mod writer;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use cli::Command;
use model::ProcessedHost;

/// Initialise logging; `RUST_LOG` overrides the default filter.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "netscript=debug" } else { "netscript=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn run() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_logging(args.verbose);
    let target = args.command.target();

    // 1. ── Parse ──────────────────────────────────────────────────────
    let costs = parser::load_cost_table(args.costs.as_deref())?;
    let host = parser::load_host(&target.input, &args.hostname)
        .with_context(|| format!("Loading scripts from {}", target.input.display()))?;
    let scripts = processor::select_scripts(&host, &target.files)?;

    // 2. ── Process ────────────────────────────────────────────────────
    let mut processed = ProcessedHost {
        hostname: host.hostname.clone(),
        ..ProcessedHost::default()
    };
    match &args.command {
        Command::Ram(_) => {
            processed.ram = processor::ram_usage(&host, &scripts, &costs);
            print!("{}", writer::report::render(&processed.ram));
        }
        Command::Compile(_) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .with_context(|| "Starting the compile runtime")?;
            processed.modules = runtime.block_on(processor::compile(&host, &scripts));
            for module in &processed.modules {
                match &module.error {
                    Some(error) => println!("{}: {error}", module.filename),
                    None => println!("{}: ok", module.filename),
                }
            }
        }
    }

    // 3. ── Write outputs ──────────────────────────────────────────────
    let Some(output) = &target.output else {
        return Ok(());
    };
    std::fs::create_dir_all(output)
        .with_context(|| format!("Creating {}", output.display()))?;
    match &args.command {
        Command::Ram(_) => writer::report::emit(&processed, output)
            .with_context(|| "Writing RAM report")?,
        Command::Compile(_) => writer::modules::emit(&processed, output)
            .with_context(|| "Writing compiled modules")?,
    }

    Ok(())
}
