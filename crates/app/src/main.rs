use clap::Parser;
use gesture_volume::cli::{self, Cli};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli::handle_command(cli)
}
