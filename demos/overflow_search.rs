//! Looks for an integer overflow in an allocation size computed as
//! `count * elem_size + header`, the way a `malloc` argument is typically built,
//! and optionally whether that size can exceed `--max-size`.
//!
//! Run with:
//! ```bash
//! cargo run --example overflow_search -- --width 16 --elem-size 12 --header 8 --limit 0x4000
//! ```

use clap::Parser;
use color_eyre::eyre::bail;

use overflow_rs::blast::{BddSolver, BddSolverConfig};
use overflow_rs::constraints::ConstraintSet;
use overflow_rs::expr::ExprManager;
use overflow_rs::overflow::SizeBound;
use overflow_rs::search::OverflowSearch;
use overflow_rs::types::Width;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Bit-width of the computation (8, 16, 32 or 64).
    #[arg(long, value_name = "INT", default_value = "16")]
    width: u32,

    /// Size of one element.
    #[arg(long, value_name = "INT", default_value = "12", value_parser = parse_int)]
    elem_size: u64,

    /// Constant added to the product.
    #[arg(long, value_name = "INT", default_value = "8", value_parser = parse_int)]
    header: u64,

    /// Upper bound on `count` checked by the program before the allocation.
    #[arg(long, value_name = "INT", value_parser = parse_int)]
    limit: Option<u64>,

    /// Also check whether the size can exceed this many bytes.
    #[arg(long, value_name = "INT", value_parser = parse_int)]
    max_size: Option<u64>,

    /// Maximum number of BDD nodes per solver query.
    #[arg(long, value_name = "INT", default_value = "1048576")]
    max_nodes: usize,

    /// Log level.
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log: simplelog::LevelFilter,
}

fn parse_int(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    if !matches!(args.width, 8 | 16 | 32 | 64) {
        bail!("Unsupported width {}", args.width);
    }
    let width = Width::new(args.width);

    let mgr = ExprManager::new();
    let count = mgr.mk_symbolic("count", width);
    let product = mgr.mk_mul(count, mgr.mk_const(args.elem_size, width));
    let size = mgr.mk_add(product, mgr.mk_const(args.header, width));
    println!("size = {}", mgr.to_sexpr(size));

    let mut constraints = ConstraintSet::new();
    if let Some(limit) = args.limit {
        constraints.push(mgr.mk_ult(count, mgr.mk_const(limit, width)));
    }

    let solver = BddSolver::with_config(BddSolverConfig {
        max_nodes: args.max_nodes,
    });
    let mut search = OverflowSearch::new(&mgr, solver);

    let time_search = std::time::Instant::now();
    let res = search.find(size, &mut constraints)?;
    let time_search = time_search.elapsed();
    println!("stats = {:?}", search.stats());

    match res {
        Some(cex) => {
            println!(
                "Found overflow in {} at depth {}: {}",
                mgr.kind(cex.node),
                cex.depth,
                mgr.to_sexpr(cex.node)
            );
            print!("{}", cex.solution);
        }
        None => println!("No overflow found"),
    }
    println!("Search done in {:.3} s", time_search.as_secs_f64());

    if let Some(max_size) = args.max_size {
        match search.check_size(size, &mut constraints, SizeBound::Unsigned(max_size))? {
            Some(cex) => {
                println!("Size can exceed {:#x}:", max_size);
                print!("{}", cex.solution);
            }
            None => println!("Size never exceeds {:#x}", max_size),
        }
    }

    Ok(())
}
