use clap::Parser;
use forest_cse::convert::parse_system;
use forest_cse::generator::{CollectorKind, FilterKind, Generation, Generator, Options};
use std::process;

#[derive(Parser)]
#[command(name = "forest-cse")]
#[command(about = "Find shared subexpressions in a system of state equations")]
#[command(version)]
struct Args {
    /// Equations of the form `state = expression`
    #[arg(required = true)]
    equations: Vec<String>,

    /// Strategy used to find repeated subexpressions
    #[arg(long, value_enum, default_value_t = CollectorKind::Default)]
    collector: CollectorKind,

    /// Strategy used to resolve overlapping candidates
    #[arg(long, value_enum, default_value_t = FilterKind::Greedy)]
    filter: FilterKind,

    /// Smallest subexpression, in nodes, worth a function of its own
    #[arg(long, default_value_t = 3)]
    min_size: u32,

    /// Ignore labels while minimizing the DAG (graph collector only)
    #[arg(long)]
    unlabeled: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match generate(&args) {
        Ok(generation) => {
            println!("{}", generation);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn generate(args: &Args) -> Result<Generation, Box<dyn std::error::Error>> {
    let (_, equations) = parse_system(&args.equations)?;

    let options = Options::default()
        .collector(args.collector)
        .filter(args.filter)
        .minimum_embedding_size(args.min_size)
        .labeled(!args.unlabeled);

    let generation = Generator::new(options)?.run(&equations)?;

    Ok(generation)
}
