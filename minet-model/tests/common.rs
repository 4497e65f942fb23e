use minet_core::tensor::randn;
use minet_core::Tensor;
use minet_model::LightMINetConfig;
use rand::rngs::StdRng;
use rand::SeedableRng;

// Shared by several integration test binaries; not every binary uses every helper.
#[allow(dead_code)]
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Widths divided by 16 so a 32x32 forward + backward runs quickly in debug builds.
#[allow(dead_code)]
pub fn small_config() -> LightMINetConfig {
    LightMINetConfig::default().scaled(16).with_seed(7)
}

#[allow(dead_code)]
pub fn image(shape: &[usize], seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    randn(shape, &mut rng).expect("Test image creation failed")
}
