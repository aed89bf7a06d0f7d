use chain_hash::Config;
use chain_hash::HashTable;
use chain_hash::TableStats;
use clap::Parser;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Fills a table with random `u32` keys, hashed with the identity function,
/// and prints its statistics just before each doubling.
#[derive(Parser, Debug)]
struct Args {
    /// Grow thresholds to sweep.
    #[arg(
        short = 'm',
        long = "max-load",
        value_delimiter = ',',
        default_values_t = [0.2, 0.5, 0.8, 1.0, 1.25, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
    )]
    max_loads: Vec<f64>,

    /// Number of doublings to report per threshold.
    #[arg(short = 'r', long = "rows", default_value_t = 6)]
    rows: usize,

    /// Entries allocated by a bucket's first insertion.
    #[arg(short = 'b', long = "bucket-size", default_value_t = 1)]
    bucket_size: usize,

    /// Seed for the random keys and values.
    #[arg(short = 's', long = "seed", default_value_t = 0)]
    seed: u64,

    /// Print only the last row of each threshold.
    #[arg(long)]
    summary: bool,
}

fn value(stats: &TableStats) -> f64 {
    let collision_rate = stats.collision_rate();
    if collision_rate == 0.0 {
        0.0
    } else {
        stats.efficiency() * stats.efficiency() / collision_rate
    }
}

fn sweep(args: &Args, max_load: f64) -> Result<Vec<TableStats>, chain_hash::Error> {
    let config = Config::default()
        .with_bucket_size(args.bucket_size)
        .with_max_load(max_load)
        .without_min_load();
    let mut table: HashTable<u32, u32> = HashTable::try_with_config(config)?;
    let mut rng = SmallRng::seed_from_u64(args.seed);

    let mut rows = Vec::with_capacity(args.rows);
    for _ in 0..args.rows {
        let capacity = table.capacity();
        let mut stats = table.stats();
        while table.capacity() == capacity {
            stats = table.stats();
            let key: u32 = rng.random();
            table.set(key, key, rng.random(), |a, b| a == b)?;
        }
        rows.push(stats);
    }

    Ok(rows)
}

fn main() -> Result<(), chain_hash::Error> {
    env_logger::init();
    let args = Args::parse();

    println!(
        "chain-hash bucket_size: {}, min_capacity: {}, seed: {}",
        args.bucket_size,
        Config::default().min_capacity(),
        args.seed
    );
    let header = TableStats::header();
    let mut lines = header.lines();
    println!("{:<5} | {} | value", "max", lines.next().unwrap_or_default());
    for rule in lines {
        println!("------+-{}-+------", rule);
    }

    for &max_load in &args.max_loads {
        let rows = sweep(&args, max_load)?;
        let shown = if args.summary {
            &rows[rows.len().saturating_sub(1)..]
        } else {
            &rows[..]
        };

        for stats in shown {
            println!("{:<5.2} | {} | {:.3}", max_load, stats.row(), value(stats));
        }
    }

    Ok(())
}
