//! eqsn Demo Suite
//!
//! Small programs showing the entangled-qubit kernel at work:
//!
//! - **Create and measure**: single-qubit gates and measurement
//! - **EPR pairs**: Bell-state correlation over many runs
//! - **Threads**: many callers hammering one qubit concurrently
//! - **GHZ**: a CNOT chain merging k qubits into one group
//!
//! The circuit helpers here are shared by the binaries and the tests.

use clap::Args;
use console::style;
use eqsn_kernel::{Kernel, KernelConfig, KernelError, KernelResult, QubitKey};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Kernel options shared by every demo.
#[derive(Args, Debug, Clone)]
pub struct KernelArgs {
    /// Execution contexts (defaults to available parallelism)
    #[arg(short, long, env = "EQSN_WORKERS")]
    pub workers: Option<usize>,

    /// Seed for reproducible measurements
    #[arg(short, long, env = "EQSN_SEED")]
    pub seed: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl KernelArgs {
    /// Kernel configuration described by the flags.
    pub fn config(&self) -> KernelConfig {
        let mut config = KernelConfig::default();
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        config
    }

    /// Install logging and start a kernel.
    pub fn start(&self) -> anyhow::Result<Kernel> {
        init_logging(self.verbose);
        let config = self.config();
        info!(workers = config.workers, seed = ?config.seed, "starting kernel");
        Ok(Kernel::new(config)?)
    }
}

/// Install a `tracing` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Create `a` and `b` and entangle them into (|00⟩ + |11⟩)/√2.
pub fn epr_pair(kernel: &Kernel, a: &QubitKey, b: &QubitKey) -> KernelResult<()> {
    kernel.create(a.clone())?;
    kernel.create(b.clone())?;
    kernel.h_gate(b.clone())?;
    kernel.cnot_gate(a.clone(), b.clone())
}

/// Longest GHZ chain the demos build. Gates on a k-qubit group use dense
/// 2^k x 2^k operators.
pub const MAX_GHZ_QUBITS: usize = 10;

/// Create `keys` and entangle them into a GHZ state with a CNOT chain.
///
/// Chains longer than [`MAX_GHZ_QUBITS`] are rejected before any qubit is
/// created.
pub fn ghz_chain(kernel: &Kernel, keys: &[QubitKey]) -> KernelResult<()> {
    if keys.len() > MAX_GHZ_QUBITS {
        return Err(KernelError::InvalidOperands(format!(
            "a GHZ chain holds at most {MAX_GHZ_QUBITS} qubits, got {}",
            keys.len()
        )));
    }
    for key in keys {
        kernel.create(key.clone())?;
    }
    let Some(first) = keys.first() else {
        return Ok(());
    };
    kernel.h_gate(first.clone())?;
    for pair in keys.windows(2) {
        kernel.cnot_gate(pair[1].clone(), pair[0].clone())?;
    }
    Ok(())
}

/// Keys `prefix0`, `prefix1`, ...
pub fn numbered_keys(prefix: &str, count: usize) -> Vec<QubitKey> {
    (0..count)
        .map(|i| QubitKey::new(format!("{prefix}{i}")))
        .collect()
}

/// Create a progress bar for demo operations.
pub fn create_progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(template) = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    ) {
        pb.set_style(template.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb
}

/// Print a demo header.
pub fn print_header(title: &str) {
    println!();
    println!("{}", style("═".repeat(60)).cyan());
    println!("{}", style(format!("  {title}")).cyan().bold());
    println!("{}", style("═".repeat(60)).cyan());
    println!();
}

/// Print a demo section.
pub fn print_section(title: &str) {
    println!();
    println!("{}", style(format!("▶ {title}")).green().bold());
    println!("{}", style("─".repeat(40)).dim());
}

/// Print a result line.
pub fn print_result(label: &str, value: impl std::fmt::Display) {
    println!("  {} {}", style(format!("{label}:")).dim(), value);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", style("✓").green().bold(), message);
}

/// Print a failure message.
pub fn print_failure(message: &str) {
    println!("{} {}", style("✗").red().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", style("ℹ").blue(), message);
}
