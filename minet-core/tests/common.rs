use minet_core::tensor::randn;
use minet_core::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Shared by several integration test binaries; not every binary uses every helper.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[allow(dead_code)]
pub fn seeded_input(shape: &[usize], seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    randn(shape, &mut rng).expect("Test input creation failed")
}
