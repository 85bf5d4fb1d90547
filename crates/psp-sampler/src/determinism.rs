use psp_core::derive_substream_seed;

/// Derives the deterministic seed for one step of the chain at `chain_slot`.
pub fn step_seed(master_seed: u64, chain_slot: usize, step: usize) -> u64 {
    let intermediate = derive_substream_seed(master_seed, step as u64);
    derive_substream_seed(intermediate, chain_slot as u64)
}

/// Derives the seed for the Monte Carlo draws inside one region ellipsoid.
pub fn region_seed(master_seed: u64, region: usize) -> u64 {
    derive_substream_seed(master_seed ^ 0x5A5A_5A5A_5A5A_5A5A, region as u64)
}

/// Derives the seed for the uniform reference draws used by bias correction.
pub fn reference_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ 0xA5A5_A5A5_A5A5_A5A5, u64::MAX)
}
