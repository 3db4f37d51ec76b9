//! cmirror CLI - keeps a local mirror of an analysis server in sync.

use clap::Parser;
use connected_mirror::CancelToken;
use connected_mirror::cli::{Cli, Commands};
use connected_mirror::commands::{self, Output};
use connected_mirror::config::{self, ConfigOverrides};
use connected_mirror::logging;
use connected_mirror::sync::SyncRequest;
use std::process;
use std::time::Instant;
use tracing::debug;

fn main() {
    let cli = Cli::parse();
    let human = cli.human_readable;
    logging::init(cli.verbose);

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        debug!(error = %e, "Could not install the Ctrl-C handler");
    }

    let overrides = ConfigOverrides {
        config_path: cli.config,
        data_dir: cli.data_dir,
    };

    let start = Instant::now();
    let result = run_command(cli.command, &overrides, human, &cancel);
    debug!(duration_ms = start.elapsed().as_millis() as u64, "Command finished");

    if let Err(e) = result {
        if human {
            eprintln!("Error: {}", e);
        } else {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        }
        process::exit(1);
    }
}

fn run_command(
    command: Commands,
    overrides: &ConfigOverrides,
    human: bool,
    cancel: &CancelToken,
) -> Result<(), connected_mirror::Error> {
    let settings = config::resolve(overrides)?;
    match command {
        Commands::Sync {
            target,
            languages,
            embedded_plugins,
            force_server_info,
        } => {
            let request = SyncRequest {
                project_key: target.project,
                branch: target.branch,
                languages: languages.into_iter().collect(),
                force_server_info,
            };
            let result = commands::sync(
                &settings,
                &target.connection,
                &request,
                embedded_plugins.into_iter().collect(),
                cancel,
            )?;
            output(&result, human);
        }
        Commands::RefreshFile {
            target,
            binding,
            ide_path,
        } => {
            let binding = binding.binding(&target.project);
            match commands::refresh_file(&settings, &target.connection, &binding, &ide_path, &target.branch, cancel) {
                Ok(result) => output(&result, human),
                Err(e) if e.is_cancellation() => {
                    if human {
                        println!("Refresh of {} skipped (cancelled)", ide_path);
                    } else {
                        println!("{}", serde_json::json!({ "ide_path": ide_path, "skipped": true }));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Commands::Status {
            connection,
            project,
            branch,
        } => {
            let result = commands::status(
                &settings.storage_root.value,
                &connection,
                project.as_deref(),
                branch.as_deref(),
            )?;
            output(&result, human);
        }
        Commands::Findings {
            target,
            binding,
            ide_path,
        } => {
            let binding = binding.binding(&target.project);
            let result = commands::findings(
                &settings.storage_root.value,
                &target.connection,
                &binding,
                &target.branch,
                &ide_path,
            )?;
            output(&result, human);
        }
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}
