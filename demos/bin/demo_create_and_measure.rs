//! Create and Measure Demo
//!
//! Single-qubit gates followed by destructive measurement.

use clap::Parser;

use eqsn_demos::{KernelArgs, print_header, print_result, print_section, print_success};

#[derive(Parser, Debug)]
#[command(name = "demo-create-and-measure")]
#[command(about = "Apply X and H to fresh qubits and measure them")]
struct Args {
    /// Number of repetitions
    #[arg(short = 'n', long, default_value = "100")]
    runs: usize,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let kernel = args.kernel.start()?;

    print_header("Create and Measure Demo");

    print_section("X gate");
    let mut ones = 0usize;
    for _ in 0..args.runs {
        kernel.create("q")?;
        kernel.x_gate("q")?;
        ones += usize::from(kernel.measure("q", true)?);
    }
    print_result("Outcome 1", format!("{ones}/{}", args.runs));

    print_section("Hadamard gate");
    let mut ones = 0usize;
    for _ in 0..args.runs {
        kernel.create("q")?;
        kernel.h_gate("q")?;
        ones += usize::from(kernel.measure("q", true)?);
    }
    print_result("Outcome 1", format!("{ones}/{}", args.runs));
    print_result(
        "Fraction",
        format!("{:.2}", ones as f64 / args.runs.max(1) as f64),
    );

    kernel.shutdown();
    println!();
    print_success("Create and measure demo complete!");
    Ok(())
}
