use clap::CommandFactory;
use clap_complete::Shell;

use crate::Cli;

pub fn print_completions(shell: Shell) {
    let mut command = Cli::command();
    clap_complete::generate(shell, &mut command, "chainup", &mut std::io::stdout());
}
