use std::fs;

use anyhow::{Context, Result};
use chainup_core::Environment;
use chainup_deploy::Coordinator;
use chainup_forge::ActionBuilder;
use chainup_registry::FileStore;

use crate::completion::print_completions;
use crate::flows::{
    default_state_root, format_environment_lines, format_status_lines, parse_signer_config,
    run_advance,
};
use crate::render::print_status;
use crate::session::{load_session, write_session};
use crate::{Cli, Commands, EnvCommands, UpgradeCommands};

pub fn run_cli(cli: Cli) -> Result<()> {
    let state_root = match cli.state_root {
        Some(root) => root,
        None => default_state_root()?,
    };
    let store = FileStore::new(state_root);
    let builder = match cli.build_tool {
        Some(program) => ActionBuilder::new(program),
        None => ActionBuilder::default(),
    };
    let coordinator = Coordinator::new(store.clone(), builder);

    match cli.command {
        Commands::Login { operator } => {
            let session = write_session(&store, &operator)?;
            print_status("ok", &format!("logged in as {}", session.operator));
        }
        Commands::Env { command } => match command {
            EnvCommands::Create {
                id,
                precedes,
                signer,
            } => {
                let session = load_session(&store)?;
                let environment = Environment {
                    id: id.clone(),
                    precedes,
                    contract_addresses: Default::default(),
                    signing_strategy: parse_signer_config(&signer)?,
                    latest_deployed_commit: None,
                };
                coordinator.registry().register_environment(&environment)?;
                print_status(
                    "ok",
                    &format!("environment {id} created by {}", session.operator),
                );
            }
            EnvCommands::List => {
                for name in coordinator.registry().list_environments()? {
                    println!("{name}");
                }
            }
            EnvCommands::Show { id } => {
                let environment = coordinator.registry().load_environment(&id)?;
                for line in format_environment_lines(&environment) {
                    println!("{line}");
                }
            }
        },
        Commands::Upgrade { command } => match command {
            UpgradeCommands::Register { path } => {
                load_session(&store)?;
                let raw = fs::read_to_string(&path).with_context(|| {
                    format!("failed reading upgrade definition: {}", path.display())
                })?;
                let definition = coordinator.registry().register_upgrade(&raw)?;
                print_status(
                    "ok",
                    &format!("upgrade {} v{} registered", definition.id, definition.version),
                );
            }
        },
        Commands::Begin {
            environment,
            upgrade,
        } => {
            load_session(&store)?;
            let record = coordinator.begin(&environment, &upgrade)?;
            print_status(
                "ok",
                &format!(
                    "deploy of {} started in phase {}",
                    record.upgrade_id,
                    record.phase.as_str()
                ),
            );
        }
        Commands::Advance {
            environment,
            wait,
            timeout_secs,
        } => {
            load_session(&store)?;
            run_advance(&coordinator, &environment, wait, timeout_secs)?;
        }
        Commands::Status { environment } => {
            let status = coordinator.status(&environment)?;
            for line in format_status_lines(&status) {
                println!("{line}");
            }
        }
        Commands::Abort {
            environment,
            reason,
        } => {
            let session = load_session(&store)?;
            coordinator.abort(
                &environment,
                &format!("{reason} (aborted by {})", session.operator),
            )?;
            print_status("ok", &format!("deploy aborted for {environment}"));
        }
        Commands::Completions { shell } => {
            print_completions(shell);
        }
    }

    Ok(())
}
