//! Fuzz target for the engine against the reference model
//!
//! Decodes an operation sequence and runs it through `SimDriver`, which
//! compares every engine outcome, the ledger and the privilege holders with
//! `ModelWorld` after each step.
//!
//! # Invariants
//!
//! - The engine NEVER panics on any event sequence
//! - Every outcome matches the model
//! - Counters always equal attribution records
//! - Privilege holders are exactly the inviters at or above the threshold

#![no_main]

use arbitrary::Arbitrary;
use invitrack_core::Threshold;
use invitrack_harness::{Operation, SimDriver};
use invitrack_server::MemoryStorage;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Clone, Arbitrary)]
struct EngineScenario {
    /// Threshold 1-8
    threshold: u8,
    operations: Vec<Operation>,
}

fuzz_target!(|scenario: EngineScenario| {
    let threshold = Threshold::new(u64::from(scenario.threshold % 8) + 1).expect("non-zero");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .expect("runtime build failed");

    let result = runtime.block_on(async {
        let mut driver = SimDriver::new(MemoryStorage::new(), threshold).await?;
        driver.run(&scenario.operations).await
    });

    if let Err(e) = result {
        panic!("{e}");
    }
});
