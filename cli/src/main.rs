use clap::{Parser, Subcommand};
use commands::{
    aggregate::{run_aggregate, AggregateArgs},
    convert::{run_convert, ConvertArgs},
    dump::{run_dump, DumpArgs},
};

mod commands;
mod input;

#[derive(Parser, Debug)]
#[command(author, version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Aggregate(AggregateArgs),
    Convert(ConvertArgs),
    Dump(DumpArgs),
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Aggregate(args) => run_aggregate(args),
        Commands::Convert(args) => run_convert(args),
        Commands::Dump(args) => run_dump(args),
    }
}
