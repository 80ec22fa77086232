mod cli;
mod paths;
mod run;
mod source;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Process(args)) => run::process(args),
        Some(Command::Config(args)) => run::print_config(&cli.run, args.path_only),
        Some(Command::Version) => {
            run::print_version();
            Ok(())
        }
        None => run::run(cli.run),
    }
}
