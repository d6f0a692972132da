//! EPR Pair Demo
//!
//! Entangles many Bell pairs and checks that both halves always agree.

use clap::Parser;

use eqsn_demos::{
    KernelArgs, create_progress_bar, epr_pair, print_failure, print_header, print_result,
    print_section, print_success,
};
use eqsn_kernel::QubitKey;

#[derive(Parser, Debug)]
#[command(name = "demo-epr")]
#[command(about = "Create EPR pairs and verify their measurement correlation")]
struct Args {
    /// Number of EPR pairs
    #[arg(short = 'n', long, default_value = "500")]
    pairs: u64,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let kernel = args.kernel.start()?;

    print_header("EPR Pair Demo");

    print_section("Measuring pairs");
    let pb = create_progress_bar(args.pairs, "pairs");
    let (mut zeros, mut ones, mut mismatched) = (0u64, 0u64, 0u64);
    for i in 0..args.pairs {
        let a = QubitKey::new(format!("a{i}"));
        let b = QubitKey::new(format!("b{i}"));
        epr_pair(&kernel, &a, &b)?;
        let ma = kernel.measure(a, true)?;
        let mb = kernel.measure(b, true)?;
        match (ma, mb) {
            (0, 0) => zeros += 1,
            (1, 1) => ones += 1,
            _ => mismatched += 1,
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    print_result("|00⟩", zeros);
    print_result("|11⟩", ones);
    print_result("Mismatched", mismatched);

    kernel.shutdown();
    println!();
    if mismatched == 0 {
        print_success("Every pair was correlated");
        Ok(())
    } else {
        print_failure("Some pairs disagreed");
        anyhow::bail!("{mismatched} of {} pairs disagreed", args.pairs)
    }
}
