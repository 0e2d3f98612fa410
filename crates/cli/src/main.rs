use anyhow::Result;
use clap::{Parser, Subcommand};
use string_slicer::commands::{
    init_project_command, list_runs_command, project_info_command, recover_command,
    regions_command, show_run_command, RecoverArgs,
};
use string_slicer::parse_number;

/// String-slice recovery assistant CLI.
///
/// This CLI is a thin wrapper around `slicer-core` (exposed in code as `slicer_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "string-slicer",
    version,
    about = "Recover string slices from analyzed binaries",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a new project at the given root.
    ///
    /// This will:
    /// - Create a `.slicer` metadata directory and a `reports` directory.
    /// - Write a `.slicer/project.json` config file.
    /// - Create the project database.
    InitProject {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Optional project name. If omitted, the name is derived from the root directory.
        #[arg(long)]
        name: Option<String>,

        /// Overwrite an existing project config.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Show basic information about an existing project.
    ProjectInfo {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the segments and sections of an object file (ELF, PE or Mach-O).
    Regions {
        /// Path to the object file.
        #[arg(long)]
        binary: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Recover string slices from pointers into read-only data.
    ///
    /// Runs against an analysis snapshot (JSON) and records the run in the
    /// project database.
    Recover {
        /// Project root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Analysis snapshot to recover from.
        #[arg(long)]
        snapshot: String,

        /// Binary the snapshot was taken from. Used for the run hash, and as the
        /// memory view when the snapshot carries no segments.
        #[arg(long)]
        binary: Option<String>,

        /// Name recorded for the binary. Defaults to the binary or snapshot file name.
        #[arg(long)]
        name: Option<String>,

        /// YAML recovery profile overriding the project's recovery settings.
        #[arg(long)]
        profile: Option<String>,

        /// Exclusive upper bound for accepted lengths (decimal or 0x-prefixed hex).
        #[arg(long, value_parser = parse_number)]
        max_length: Option<u64>,

        /// Write the resulting types and data variables to this JSON file.
        #[arg(long)]
        output: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List recorded recovery runs.
    ListRuns {
        #[arg(long, default_value = ".")]
        root: String,

        /// Only show runs for this binary name.
        #[arg(long)]
        binary: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show one recorded recovery run.
    ShowRun {
        #[arg(long, default_value = ".")]
        root: String,

        /// Run id as printed by `list-runs`.
        #[arg(long)]
        id: i64,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::InitProject { root, name, force } => init_project_command(&root, name, force)?,
        Command::ProjectInfo { root, json } => project_info_command(&root, json)?,
        Command::Regions { binary, json } => regions_command(&binary, json)?,
        Command::Recover { root, snapshot, binary, name, profile, max_length, output, json } => {
            recover_command(&RecoverArgs {
                root,
                snapshot,
                binary,
                name,
                profile,
                max_length,
                output,
                json,
            })?
        }
        Command::ListRuns { root, binary, json } => {
            list_runs_command(&root, binary.as_deref(), json)?
        }
        Command::ShowRun { root, id, json } => show_run_command(&root, id, json)?,
    }

    Ok(())
}
