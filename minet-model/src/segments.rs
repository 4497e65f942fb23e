//! The eleven recomputable units of the checkpointed forward pass.
//!
//! | segments            | inputs                  | outputs           |
//! |---------------------|-------------------------|-------------------|
//! | `encoder1`          | image, gradient carrier | e1                |
//! | `encoder2`..`16`    | previous encoder output | e2, e4, e8, e16   |
//! | `transform`         | e1..e16                 | t1..t16           |
//! | `decoder16`         | t16                     | d16               |
//! | `decoder8`..`1`     | t_L, d at the coarser L | d8, d4, d2, d1    |

use std::sync::Arc;

use minet_core::autograd::Segment;
use minet_core::nn::Layer;
use minet_core::{MinetError, Tensor};

use crate::config::level_stride;
use crate::decoder::DecoderStage;
use crate::transform::LightAim;
use crate::NUM_LEVELS;

/// Total number of checkpoint segments.
pub const NUM_SEGMENTS: usize = 2 * NUM_LEVELS + 1;

fn single(output: Tensor) -> Vec<Tensor> {
    vec![output]
}

pub(crate) fn encoder_segment(index: usize, stage: Arc<dyn Layer>) -> Segment {
    let name = format!("encoder{}", 1 << index);
    if index == 0 {
        // inputs[1] is the carrier and is never read.
        Segment::new(name, 2, 1, move |inputs: &[Tensor]| {
            stage.forward(&inputs[0]).map(single)
        })
        .with_gradient_carrier()
    } else {
        Segment::new(name, 1, 1, move |inputs: &[Tensor]| {
            stage.forward(&inputs[0]).map(single)
        })
    }
}

pub(crate) fn transform_segment(transform: Arc<LightAim>) -> Segment {
    Segment::new("transform", NUM_LEVELS, NUM_LEVELS, move |inputs: &[Tensor]| {
        transform.forward(inputs)
    })
}

/// Decoder segment at decoding position `i` (0 is level 16). Every position but
/// the first takes `(lateral, coarser)`.
pub(crate) fn decoder_segment(i: usize, stage: Arc<DecoderStage>) -> Segment {
    let name = format!("decoder{}", level_stride(i));
    if i == 0 {
        Segment::new(name, 1, 1, move |inputs: &[Tensor]| {
            stage.forward(&inputs[0], None).map(single)
        })
    } else {
        Segment::new(name, 2, 1, move |inputs: &[Tensor]| {
            stage.forward(&inputs[0], Some(&inputs[1])).map(single)
        })
    }
}

/// Builds the segments in execution order: encoders, transform, decoders.
pub(crate) fn build_segments(
    encoders: &[Arc<dyn Layer>; NUM_LEVELS],
    transform: &Arc<LightAim>,
    decoders: &[Arc<DecoderStage>; NUM_LEVELS],
) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(NUM_SEGMENTS);
    segments.extend(
        encoders
            .iter()
            .enumerate()
            .map(|(i, stage)| encoder_segment(i, Arc::clone(stage))),
    );
    segments.push(transform_segment(Arc::clone(transform)));
    segments.extend(
        decoders
            .iter()
            .enumerate()
            .map(|(i, stage)| decoder_segment(i, Arc::clone(stage))),
    );
    segments
}

/// Takes the output of a 1-output segment. Arity was already checked by
/// [`Segment::call`].
pub(crate) fn only_output(segment: &Segment, outputs: Vec<Tensor>) -> Result<Tensor, MinetError> {
    outputs.into_iter().next().ok_or_else(|| MinetError::SegmentArity {
        segment: segment.name().to_string(),
        direction: "outputs",
        expected: 1,
        actual: 0,
    })
}
