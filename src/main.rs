// Prism: classical middle-end optimizer for a JSON three-address IR.
//
// Reads a program from standard input, applies the selected pass to every
// function, and writes the transformed program to standard output.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::Read;

use prism::cfg::{to_dot, Cfg, START_LABEL};
use prism::cli::{Cli, Commands, SsaArgs};
use prism::ir::{Instr, Program};
use prism::{bench, opt, ssa};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the program JSON.
    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_level.into()),
        )
        .init();

    run_command(cli)
}

fn run_command(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Bench(args) => {
            let file = File::open(&args.csv)
                .with_context(|| format!("opening benchmark CSV `{}`", args.csv))?;
            let rows = bench::aggregate(file, &args.baseline)?;
            bench::write_csv(std::io::stdout().lock(), &rows)?;
            return Ok(());
        }
        Commands::Ssa(args) if args.check_ssa => {
            let program = read_program()?;
            println!("{}", ssa::is_ssa(&program));
            return Ok(());
        }
        Commands::Cfg(args) if args.dot => {
            let program = read_program()?;
            for func in &program.functions {
                let cfg = Cfg::from_function(func)
                    .with_context(|| format!("building CFG for `{}`", func.name))?;
                print!("{}", to_dot(&cfg, START_LABEL));
            }
            return Ok(());
        }
        _ => {}
    }

    let mut program = read_program()?;
    for func in &mut program.functions {
        let instrs = apply_pass(&cli, func)
            .with_context(|| format!("optimizing function `{}`", func.name))?;
        func.instrs = instrs;
    }
    write_program(&program)
}

fn apply_pass(cli: &Cli, func: &prism::Function) -> Result<Vec<Instr>> {
    let instrs = match &cli.command {
        Commands::Cfg(_) => Cfg::from_function(func)?.into_instrs(),
        Commands::Lvn(args) => {
            if args.extended {
                opt::lvn::run_extended(func)?
            } else {
                opt::lvn::run(func)?
            }
        }
        Commands::Dce(args) => {
            if args.global {
                opt::dce::global(func)?
            } else {
                opt::dce::local(func)?
            }
        }
        Commands::Liveness(_) => opt::dce::eliminate(func)?,
        Commands::Ssa(args) => apply_ssa(args, func)?,
        Commands::Licm(_) => opt::licm::run(func)?,
        Commands::DeadStores(_) => opt::dead_store::eliminate(func)?,
        Commands::Bench(_) => unreachable!("bench handled before stdin"),
    };
    Ok(instrs)
}

fn apply_ssa(args: &SsaArgs, func: &prism::Function) -> Result<Vec<Instr>> {
    if args.from_ssa {
        return Ok(ssa::destruct(func)?);
    }
    if args.round_trip {
        let converted = prism::Function {
            instrs: ssa::construct(func)?,
            ..func.clone()
        };
        return Ok(ssa::destruct(&converted)?);
    }
    Ok(ssa::construct(func)?)
}

fn read_program() -> Result<Program> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading program from stdin")?;
    serde_json::from_str(&input).context("parsing program JSON")
}

fn write_program(program: &Program) -> Result<()> {
    let stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(stdout, program).context("writing program JSON")?;
    println!();
    Ok(())
}
