//! Concurrency Demo
//!
//! Many threads apply X to one shared qubit; the outcome is the parity of
//! the thread count.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::Parser;

use eqsn_demos::{
    KernelArgs, print_failure, print_header, print_info, print_result, print_section,
    print_success,
};

#[derive(Parser, Debug)]
#[command(name = "demo-threads")]
#[command(about = "Apply X from many threads to one qubit, then measure")]
struct Args {
    /// Number of caller threads
    #[arg(short, long, default_value = "16")]
    threads: usize,

    /// Gates applied by each thread
    #[arg(short, long, default_value = "101")]
    gates: usize,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let kernel = Arc::new(args.kernel.start()?);

    print_header("Concurrency Demo");

    print_section("Setup");
    print_result("Threads", args.threads);
    print_result("Gates per thread", args.gates);
    print_result("Execution contexts", kernel.config().workers);

    kernel.create("shared")?;
    let start = Instant::now();
    let handles: Vec<_> = (0..args.threads)
        .map(|_| {
            let kernel = Arc::clone(&kernel);
            let gates = args.gates;
            thread::spawn(move || -> eqsn_kernel::KernelResult<()> {
                for _ in 0..gates {
                    kernel.x_gate("shared")?;
                }
                Ok(())
            })
        })
        .collect();
    for handle in handles {
        match handle.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("caller thread panicked"),
        }
    }
    let outcome = kernel.measure("shared", true)?;
    let elapsed = start.elapsed();

    print_section("Result");
    let expected = u8::from((args.threads * args.gates) % 2 == 1);
    print_result("Total gates", args.threads * args.gates);
    print_result("Measured", outcome);
    print_result("Expected", expected);
    print_result("Elapsed", format!("{elapsed:.2?}"));

    kernel.shutdown();
    println!();
    if outcome == expected {
        print_success("Outcome matches the gate parity");
        print_info("Commands for one group never run concurrently");
        Ok(())
    } else {
        print_failure("Outcome does not match the gate parity");
        anyhow::bail!("expected {expected}, measured {outcome}")
    }
}
