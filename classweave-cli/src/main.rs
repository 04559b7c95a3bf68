mod app;
mod commands;
mod output;

use clap::Parser;

use crate::app::{Cli, Command};

fn main() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        eprintln!("\nCancelled.");
        std::process::exit(130);
    })
    .expect("failed to set Ctrl+C handler");

    let cli = Cli::parse();

    // classweave info+ on stderr unless --json; --verbose enables debug; RUST_LOG overrides
    if !cli.global.json {
        let level = if cli.global.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        };
        env_logger::Builder::new()
            .filter_module("classweave", level)
            .parse_default_env()
            .target(env_logger::Target::Stderr)
            .format_timestamp(None)
            .format_module_path(false)
            .format_target(false)
            .init();
    }

    match &cli.command {
        Command::List { package } => commands::list::run(package.as_deref(), &cli.global),
        Command::Scan { units, members } => commands::scan::run(units, *members, &cli.global),
        Command::Weave {
            output,
            units,
            preset,
            ignore,
            dump,
            loader,
        } => commands::weave::run(
            units,
            &commands::weave::WeaveOptions {
                output,
                preset: *preset,
                ignore,
                dump: dump.as_deref(),
                loader,
                global: &cli.global,
            },
        ),
    }
}
