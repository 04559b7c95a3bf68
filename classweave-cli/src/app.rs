use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// classweave - JVM class-file scanning and load-time weaving
#[derive(Debug, Parser)]
#[command(name = "classweave", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Class path to read units from (platform path separator). Defaults to CLASSPATH.
    #[arg(long = "classpath", visible_alias = "cp", global = true, value_name = "PATHS")]
    pub classpath: Option<String>,
}

/// Stage selection preset for `weave`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Every stage
    Default,
    /// Interface injection only
    Minimal,
    /// Every stage, discovery failures are fatal
    Strict,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every unit reachable from the class path.
    List {
        /// Show only units under this package prefix (dotted or internal form).
        #[arg(short, long)]
        package: Option<String>,
    },

    /// Scan units and print their structure and markers.
    Scan {
        /// Units to scan by qualified name (e.g. com.example.Service).
        #[arg(value_name = "UNIT", required = true)]
        units: Vec<String>,

        /// Include fields and methods.
        #[arg(short, long)]
        members: bool,
    },

    /// Weave units offline and write the modified class files to a directory.
    Weave {
        /// Directory receiving woven class files, laid out by package.
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,

        /// Units to weave by qualified name. Weaves every unit when omitted.
        #[arg(value_name = "UNIT")]
        units: Vec<String>,

        /// Stage selection preset.
        #[arg(long, value_enum, default_value_t = Preset::Default)]
        preset: Preset,

        /// Skip units under this package prefix. May be repeated.
        #[arg(long, value_name = "PREFIX")]
        ignore: Vec<String>,

        /// Also copy every modified unit into this directory.
        #[arg(long, value_name = "DIR")]
        dump: Option<PathBuf>,

        /// Name reported as the defining loader.
        #[arg(long, default_value = "classweave-cli")]
        loader: String,
    },
}
