use clap::Parser;

use symdd::context::Context;
use symdd::dd::Dd;
use symdd::options::DdOptions;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Number of queens.
    #[arg(value_name = "INT", default_value = "6")]
    n: usize,

    /// Node table size (in bits, so the actual size is `2^size` nodes).
    #[clap(long, value_name = "INT", default_value = "20")]
    size: usize,

    /// Track handles and report leaks at the end.
    #[clap(long)]
    leak_check: bool,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    let args = Cli::parse();
    println!("args = {:?}", args);

    let ctx = Context::new(
        DdOptions::default()
            .with_storage_bits(args.size)
            .with_leak_check(args.leak_check),
    )?;
    println!("ctx = {:?}", ctx);

    // One boolean variable per square, row by row
    let n = args.n;
    println!("Encoding n-queens problem with n = {}", n);
    let mut queens: Vec<Vec<Dd>> = vec![];
    for i in 0..n {
        let mut row = vec![];
        for j in 0..n {
            let v = ctx.new_dd_variable()?;
            ctx.set_variable_name(v, format!("q{}_{}", i, j));
            row.push(ctx.variable(v)?);
        }
        queens.push(row);
    }

    let mut res = ctx.new_true()?;

    // At least one queen per row
    for row in &queens {
        res = ctx.and_with(res, ctx.or_all(row)?)?;
    }

    // No two queens attack each other
    for i in 0..n {
        for j in 0..n {
            for k in 0..n {
                for l in 0..n {
                    if (i, j) >= (k, l) {
                        continue;
                    }
                    let same_row = i == k;
                    let same_col = j == l;
                    let same_diag = i + l == k + j || i + j == k + l;
                    if same_row || same_col || same_diag {
                        let both = ctx.and(queens[i][j], queens[k][l])?;
                        res = ctx.and_with(res, ctx.not_with(both)?)?;
                    }
                }
            }
        }
    }

    let all: Vec<Dd> = queens.iter().flatten().copied().collect();
    let cube = ctx.list_to_cube(&all)?;
    println!("solutions: {}", ctx.count_sat(res, cube)?);
    println!("nodes: {}", ctx.count_nodes(res)?);

    let solution = ctx.find_sat(res, cube)?;
    if !ctx.is_false(solution)? {
        let placed = ctx.find_sat_set(res, cube)?.unwrap_or_default();
        for i in 0..n {
            let line: String = (0..n)
                .map(|j| if placed.contains(&((i * n + j) as u32)) { 'Q' } else { '.' })
                .collect();
            println!("{}", line);
        }
    }

    for stats in ctx.statistics() {
        println!("{:?}", stats);
    }

    ctx.release_all(&[res, cube, solution])?;
    ctx.close()?;

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
