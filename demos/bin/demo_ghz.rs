//! GHZ State Demo
//!
//! Merges k qubits into one group with a CNOT chain and dumps the joint
//! state as JSON.

use clap::Parser;

use eqsn_demos::{
    KernelArgs, MAX_GHZ_QUBITS, ghz_chain, numbered_keys, print_header, print_result,
    print_section, print_success,
};

#[derive(Parser, Debug)]
#[command(name = "demo-ghz")]
#[command(about = "Build a GHZ state and print its snapshot")]
struct Args {
    /// Number of qubits (1 to 10; gates build dense 2^k x 2^k operators)
    #[arg(short = 'k', long, default_value = "4")]
    qubits: usize,

    /// Print the snapshot as JSON
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.qubits == 0 || args.qubits > MAX_GHZ_QUBITS {
        anyhow::bail!("qubit count must be between 1 and {MAX_GHZ_QUBITS}");
    }
    let kernel = args.kernel.start()?;

    print_header("GHZ State Demo");

    let keys = numbered_keys("q", args.qubits);
    ghz_chain(&kernel, &keys)?;

    print_section("Snapshot");
    let snapshot = kernel.snapshot(keys[0].clone())?;
    let order: Vec<&str> = snapshot.order.iter().map(|k| k.as_str()).collect();
    print_result("Order", order.join(" ⊗ "));
    print_result("Amplitudes", snapshot.amplitudes.len());
    print_result("Norm", format!("{:.6}", snapshot.norm()));
    for (index, p) in snapshot.probabilities().iter().enumerate() {
        if *p > 1e-9 {
            print_result(
                &format!("P(|{index:0width$b}⟩)", width = args.qubits),
                format!("{p:.4}"),
            );
        }
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    print_section("Measurement");
    let outcomes = keys
        .iter()
        .map(|key| kernel.measure(key.clone(), true))
        .collect::<Result<Vec<_>, _>>()?;
    let bits: String = outcomes.iter().map(u8::to_string).collect();
    print_result("Outcomes", bits);

    kernel.shutdown();
    println!();
    print_success("GHZ demo complete!");
    Ok(())
}
