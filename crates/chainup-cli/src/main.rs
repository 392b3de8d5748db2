use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

mod completion;
mod dispatch;
mod flows;
mod render;
mod session;


#[derive(Parser, Debug)]
#[command(name = "chainup")]
#[command(about = "Multi-phase on-chain upgrade coordinator", long_about = None)]
struct Cli {
    #[arg(long)]
    state_root: Option<PathBuf>,
    #[arg(long)]
    build_tool: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Login {
        #[arg(long)]
        operator: String,
    },
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    Upgrade {
        #[command(subcommand)]
        command: UpgradeCommands,
    },
    Begin {
        environment: String,
        upgrade: String,
    },
    Advance {
        environment: String,
        #[arg(long)]
        wait: bool,
        #[arg(long, default_value_t = 600, value_parser = clap::value_parser!(u64).range(1..=flows::MAX_WAIT_SECS))]
        timeout_secs: u64,
    },
    Status {
        environment: String,
    },
    Abort {
        environment: String,
        #[arg(long)]
        reason: String,
    },
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand, Debug)]
enum EnvCommands {
    Create {
        id: String,
        #[arg(long)]
        precedes: Option<String>,
        #[arg(long)]
        signer: String,
    },
    List,
    Show {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum UpgradeCommands {
    Register {
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dispatch::run_cli(cli)
}
