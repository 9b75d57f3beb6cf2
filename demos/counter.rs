use clap::Parser;
use log::info;

use symdd::context::Context;
use symdd::options::DdOptions;

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Modulus of the counter.
    #[arg(value_name = "INT", default_value = "10")]
    modulus: i64,

    /// Use the fused and-exist operation.
    #[clap(long)]
    and_exist: bool,

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
            .with_and_exist(args.and_exist)
            .with_leak_check(args.leak_check),
    )?;

    // Copy 0 is the current state, copy 1 the successor
    let n = args.modulus;
    let x = ctx.new_integer_variable("x", 0, n - 1, 2)?;
    println!("variable = {}", x);

    let cur = x.value_encoding(&ctx, 0)?;
    let next = x.value_encoding(&ctx, 1)?;

    // next = cur + 1, or next = 0 once cur hits the top
    let one = ctx.new_constant(1)?;
    let inc = ctx.add(cur, one)?;
    let step = ctx.eq_with(ctx.retain(next)?, inc)?;
    let top = ctx.new_constant(n - 1)?;
    let zero = ctx.new_constant(0)?;
    let wrap = ctx.and_with(ctx.eq(cur, top)?, ctx.eq(next, zero)?)?;
    let trans = ctx.or_with(step, wrap)?;
    let trans = ctx.and_with(trans, x.new_valid_values(&ctx, 1)?)?;
    ctx.release_all(&[cur, next, one, top, zero])?;

    let cube_cur = x.new_cube(&ctx, 0)?;
    let cube_next = x.new_cube(&ctx, 1)?;
    let swap = ctx.new_permutation_cubes(cube_cur, cube_next)?;

    // Least fixed point of the image operator
    let mut reach = x.new_variable_value(&ctx, 0, 0)?;
    let mut iterations = 0;
    loop {
        iterations += 1;
        let image = ctx.abstract_and_exist(reach, trans, cube_cur)?;
        let image = {
            let permuted = ctx.permute(image, &swap)?;
            ctx.release(image)?;
            permuted
        };
        let bigger = ctx.or_with(ctx.retain(reach)?, image)?;
        let done = bigger == reach;
        ctx.release(reach)?;
        reach = bigger;
        info!("iteration {}: {} states", iterations, ctx.count_sat(reach, cube_cur)?);
        if done {
            break;
        }
    }

    println!("reachable states: {}", ctx.count_sat(reach, cube_cur)?);
    println!("fixed point after {} iterations", iterations);
    let cur = x.value_encoding(&ctx, 0)?;
    if let Some(max) = ctx.max_over_sat(cur, reach)? {
        println!("largest reachable value: {}", max);
    }

    ctx.release_all(&[cur, reach, trans, cube_cur, cube_next])?;
    ctx.close()?;

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
