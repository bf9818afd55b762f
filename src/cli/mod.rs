// CLI command definitions

use clap::{Parser, Subcommand};

/// prism - classical middle-end optimizer for a JSON three-address IR
///
/// Every pass subcommand reads a program as JSON from standard input and
/// writes the transformed program as JSON to standard output. Malformed IR
/// exits non-zero with a diagnostic naming the offending function.
#[derive(Parser, Debug, Clone)]
#[command(name = "prism")]
#[command(author, version, about)]
pub struct Cli {
    /// Enable debug logging on stderr
    #[arg(global = true, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Route the program through CFG construction (validation / DOT export)
    Cfg(CfgArgs),

    /// Local value numbering with constant folding
    Lvn(LvnArgs),

    /// Dead-code elimination (local reassignment or global used-set)
    Dce(DceArgs),

    /// Liveness-driven global dead-code elimination
    Liveness(LivenessArgs),

    /// SSA conversion, validation, and round-tripping
    Ssa(SsaArgs),

    /// Loop-invariant code motion
    Licm(LicmArgs),

    /// Alias analysis followed by dead-store elimination
    DeadStores(DeadStoresArgs),

    /// Aggregate a benchmark results CSV against a baseline run
    Bench(BenchArgs),
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct CfgArgs {
    /// Print the DOT graph description instead of the program
    #[arg(long)]
    pub dot: bool,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct LvnArgs {
    /// Run the cross-block worklist variant
    #[arg(long)]
    pub extended: bool,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct DceArgs {
    /// Iterate the whole-function used-set cleanup instead of the local pass
    #[arg(long)]
    pub global: bool,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct LivenessArgs {}

#[derive(Parser, Debug, Clone, Copy)]
pub struct SsaArgs {
    /// Convert into SSA form (the default)
    #[arg(long)]
    pub to_ssa: bool,

    /// Convert out of SSA form
    #[arg(long, conflicts_with = "to_ssa")]
    pub from_ssa: bool,

    /// Convert into SSA form and straight back out
    #[arg(long, conflicts_with_all = ["to_ssa", "from_ssa"])]
    pub round_trip: bool,

    /// Print `true`/`false` for whether the program already is in SSA form
    #[arg(long, conflicts_with_all = ["to_ssa", "from_ssa", "round_trip"])]
    pub check_ssa: bool,
}

#[derive(Parser, Debug, Clone, Copy)]
pub struct LicmArgs {}

#[derive(Parser, Debug, Clone, Copy)]
pub struct DeadStoresArgs {}

#[derive(Parser, Debug, Clone)]
pub struct BenchArgs {
    /// Path to the `benchmark,run,result` CSV file
    #[arg(long)]
    pub csv: String,

    /// Name of the baseline run to compare against
    #[arg(long, default_value = "baseline")]
    pub baseline: String,
}
