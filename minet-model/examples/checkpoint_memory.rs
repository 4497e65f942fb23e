//! Compares peak tensor memory of the standard and the checkpointed forward
//! pass over one forward + backward step.
//!
//! Run with `RUST_LOG=info cargo run --example checkpoint_memory`.

use log::info;
use minet_core::nn::Module;
use minet_core::tensor::randn;
use minet_core::{memory, MinetError};
use minet_model::{LightMINet, LightMINetConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn peak_for(model: &LightMINet, checkpointed: bool) -> Result<usize, MinetError> {
    let mut rng = StdRng::seed_from_u64(42);
    let x = randn(&[2, 3, 64, 64], &mut rng)?;
    memory::reset_peak();
    let out = if checkpointed {
        model.forward_checkpointed(&x)?
    } else {
        model.forward_standard(&x)?
    };
    out.mean()?.backward(None)?;
    model.zero_grad();
    Ok(memory::peak_bytes())
}

fn main() -> Result<(), MinetError> {
    env_logger::init();

    let config = LightMINetConfig::default().scaled(4);
    let model = LightMINet::new(config)?;
    info!("model has {} parameters", model.num_parameters());

    let standard = peak_for(&model, false)?;
    let checkpointed = peak_for(&model, true)?;
    println!("standard forward peak:     {:>12} bytes", standard);
    println!("checkpointed forward peak: {:>12} bytes", checkpointed);
    if standard > 0 {
        println!(
            "checkpointing saves {:.1}%",
            100.0 * (standard as f64 - checkpointed as f64) / standard as f64
        );
    }
    Ok(())
}
