#![allow(unused)]
use accelerator::bitcoin::{OutPoint, Sequence, Txid};
use accelerator::testutils::{MemoryBlockchain, TestIncomingOutput, TEST_NETWORK};
use accelerator::{Accelerator, FeePolicy, UnsignedPlan};

pub type TestAccelerator<'a> = Accelerator<&'a MemoryBlockchain, &'a MemoryBlockchain>;

pub fn init_logger() {
    let _ = env_logger::try_init();
}

/// Return an engine reading from `chain` with the default policy
pub fn get_accelerator(chain: &MemoryBlockchain) -> TestAccelerator<'_> {
    init_logger();
    Accelerator::new(chain, chain, TEST_NETWORK, FeePolicy::default())
}

pub fn wallet(addresses: &[&str]) -> Vec<String> {
    addresses.iter().map(|a| a.to_string()).collect()
}

pub fn outputs(outputs: &[(u64, &str)]) -> Vec<TestIncomingOutput> {
    outputs
        .iter()
        .map(|(value, address)| TestIncomingOutput::new(*value, address))
        .collect()
}

/// Fund each `(value, address)` in a single confirmed transaction and return the new outpoints
pub fn fund(chain: &mut MemoryBlockchain, funding: &[(u64, &str)]) -> Vec<OutPoint> {
    let txid = chain.fund(outputs(funding));
    (0..funding.len())
        .map(|vout| OutPoint::new(txid, vout as u32))
        .collect()
}

/// Fund the inputs, then broadcast an unconfirmed transaction spending them
pub fn get_stuck_tx(
    chain: &mut MemoryBlockchain,
    inputs: &[(u64, &str)],
    outs: &[(u64, &str)],
    sequence: Sequence,
    vsize: u64,
) -> Txid {
    let spend = fund(chain, inputs);
    chain.broadcast(spend, outputs(outs), sequence, vsize)
}

/// `Σinputs == Σoutputs + fee`, both from the PSBT and from the summary
pub fn assert_balanced(plan: &UnsignedPlan) {
    let input_value = plan
        .psbt()
        .inputs
        .iter()
        .map(|input| input.witness_utxo.as_ref().unwrap().value.to_sat())
        .sum::<u64>();
    let output_value = plan.output_values().iter().sum::<u64>();
    assert_eq!(input_value, output_value + plan.implied_fee());

    let summary = plan.summary();
    assert_eq!(summary.inputs.value, summary.outputs.value + summary.fee);
    assert_eq!(summary.fee, plan.implied_fee());
}

/// No output strictly between 0 and the dust limit, except `preserved` outputs
pub fn assert_no_dust(plan: &UnsignedPlan, preserved: &[usize]) {
    for (index, value) in plan.output_values().into_iter().enumerate() {
        if preserved.contains(&index) {
            continue;
        }
        assert!(
            value == 0 || value >= 546,
            "output #{} is dust: {} sat",
            index,
            value
        );
    }
}
