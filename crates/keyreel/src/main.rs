mod cli;
mod present;
mod report;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Command::State(args) => run::run_state(args),
        Command::Render(args) => run::run_render(args),
        Command::Play(args) => run::run_play(args),
    }
}
