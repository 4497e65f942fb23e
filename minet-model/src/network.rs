use std::sync::Arc;

use log::{debug, info};
use minet_core::autograd::{checkpoint, Segment};
use minet_core::nn::{Conv2d, Conv2dOptions, Layer, Module};
use minet_core::tensor::ones;
use minet_core::{MinetError, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::backbone::{Backbone, Vgg16Backbone};
use crate::config::{level_stride, LightMINetConfig};
use crate::decoder::DecoderStage;
use crate::segments::{build_segments, only_output};
use crate::transform::LightAim;
use crate::NUM_LEVELS;

/// The LightMINet saliency network.
///
/// Owns its sub-modules behind `Arc`s so that the checkpoint segments can
/// share them. Both forward variants read the same parameters and produce the
/// same values; the checkpointed one keeps only segment boundaries alive.
#[derive(Debug)]
pub struct LightMINet {
    config: LightMINetConfig,
    backbone: Arc<dyn Backbone>,
    encoders: [Arc<dyn Layer>; NUM_LEVELS],
    transform: Arc<LightAim>,
    /// Decoding order: level 16 first.
    decoders: [Arc<DecoderStage>; NUM_LEVELS],
    classifier: Conv2d,
    carrier: Tensor,
    segments: Vec<Segment>,
}

impl LightMINet {
    /// Builds the full model with a VGG16 backbone from `config.seed`.
    pub fn new(config: LightMINetConfig) -> Result<Self, MinetError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let backbone = Vgg16Backbone::new(
            config.in_channels,
            config.encoder_channels,
            config.bn_momentum,
            config.bn_eps,
            &mut rng,
        )?;
        Self::assemble(config, Arc::new(backbone), &mut rng)
    }

    /// Builds the model around a caller-provided backbone.
    ///
    /// The backbone's input and per-level widths must match the config; this is
    /// checked before any other parameter is allocated.
    pub fn from_backbone(
        config: LightMINetConfig,
        backbone: Arc<dyn Backbone>,
    ) -> Result<Self, MinetError> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        Self::assemble(config, backbone, &mut rng)
    }

    fn assemble(
        config: LightMINetConfig,
        backbone: Arc<dyn Backbone>,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        check_backbone(&config, backbone.as_ref())?;
        let (momentum, eps) = (config.bn_momentum, config.bn_eps);

        let transform = Arc::new(LightAim::new(
            config.encoder_channels,
            config.transform_channels,
            momentum,
            eps,
            rng,
        )?);

        let mut decoders = Vec::with_capacity(NUM_LEVELS);
        for i in 0..NUM_LEVELS {
            decoders.push(Arc::new(DecoderStage::new(
                config.decoder_input_channels(i),
                config.sim_channels[i],
                config.decoder_channels[i],
                momentum,
                eps,
                rng,
            )?));
        }
        let decoders: [Arc<DecoderStage>; NUM_LEVELS] = decoders
            .try_into()
            .map_err(|_| MinetError::InternalError("decoder stage count".to_string()))?;

        let classifier = Conv2d::new(
            config.decoder_channels[NUM_LEVELS - 1],
            1,
            1,
            Conv2dOptions::same(1),
            rng,
        )?;

        let carrier = ones(&[1])?;
        carrier.set_requires_grad(true)?;

        let encoders = backbone.stages();
        let segments = build_segments(&encoders, &transform, &decoders);

        let model = LightMINet {
            config,
            backbone,
            encoders,
            transform,
            decoders,
            classifier,
            carrier,
            segments,
        };
        info!(
            "LightMINet: {} parameters, {} forward",
            model.num_parameters(),
            if model.config.checkpointing { "checkpointed" } else { "standard" }
        );
        Ok(model)
    }

    pub fn config(&self) -> &LightMINetConfig {
        &self.config
    }

    /// The checkpoint segments in execution order (5 encoders, the transform,
    /// then the decoders from level 16 to level 1).
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The inert tensor passed to the first segment alongside the image.
    pub fn carrier(&self) -> &Tensor {
        &self.carrier
    }

    /// Encoder stage at pyramid index `index` (0 is stride 1).
    pub fn encoder(&self, index: usize) -> Option<&Arc<dyn Layer>> {
        self.encoders.get(index)
    }

    pub fn backbone(&self) -> &Arc<dyn Backbone> {
        &self.backbone
    }

    /// Runs the variant selected by [`LightMINetConfig::checkpointing`].
    pub fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        if self.config.checkpointing {
            self.forward_checkpointed(input)
        } else {
            self.forward_standard(input)
        }
    }

    /// Plain forward pass; every intermediate activation stays alive until
    /// backward.
    pub fn forward_standard(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        self.check_input(input)?;

        let mut levels = Vec::with_capacity(NUM_LEVELS);
        let mut x = input.clone();
        for encoder in &self.encoders {
            x = encoder.forward(&x)?;
            levels.push(x.clone());
        }
        let transformed = self.transform.forward(&levels)?;
        drop(levels);

        let mut decoded = self.decoders[0].forward(&transformed[NUM_LEVELS - 1], None)?;
        for (i, stage) in self.decoders.iter().enumerate().skip(1) {
            decoded = stage.forward(&transformed[NUM_LEVELS - 1 - i], Some(&decoded))?;
        }
        self.head(&decoded)
    }

    /// Forward pass through the 11 checkpoint segments. Only segment inputs
    /// and outputs are kept; the rest is recomputed during backward.
    pub fn forward_checkpointed(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        self.check_input(input)?;
        let (encoders, rest) = self.segments.split_at(NUM_LEVELS);
        let (transform, decoders) = rest.split_at(1);

        let mut levels = Vec::with_capacity(NUM_LEVELS);
        let first = &encoders[0];
        let mut x = only_output(first, checkpoint(first, &[input.clone(), self.carrier.clone()])?)?;
        levels.push(x.clone());
        for segment in &encoders[1..] {
            x = only_output(segment, checkpoint(segment, &[x])?)?;
            levels.push(x.clone());
        }
        drop(x);

        let transformed = checkpoint(&transform[0], &levels)?;
        drop(levels);

        let mut decoded = only_output(
            &decoders[0],
            checkpoint(&decoders[0], &[transformed[NUM_LEVELS - 1].clone()])?,
        )?;
        for (i, segment) in decoders.iter().enumerate().skip(1) {
            let lateral = transformed[NUM_LEVELS - 1 - i].clone();
            decoded = only_output(segment, checkpoint(segment, &[lateral, decoded])?)?;
            debug!("LightMINet: decoded level {}", level_stride(i));
        }
        self.head(&decoded)
    }

    fn head(&self, decoded: &Tensor) -> Result<Tensor, MinetError> {
        self.classifier.forward(decoded)?.sigmoid()
    }

    fn check_input(&self, input: &Tensor) -> Result<(), MinetError> {
        let [_, channels, h, w] = input.dims4("LightMINet input")?;
        if channels != self.config.in_channels {
            return Err(MinetError::ChannelMismatch {
                operation: "LightMINet input".to_string(),
                expected: self.config.in_channels,
                actual: channels,
            });
        }
        let multiple = self.config.input_multiple;
        if h == 0 || w == 0 || h % multiple != 0 || w % multiple != 0 {
            return Err(MinetError::InvalidInputShape {
                shape: input.shape(),
                reason: format!("height and width must be positive multiples of {multiple}"),
            });
        }
        Ok(())
    }
}

fn check_backbone(config: &LightMINetConfig, backbone: &dyn Backbone) -> Result<(), MinetError> {
    if backbone.in_channels() != config.in_channels {
        return Err(MinetError::ChannelMismatch {
            operation: "backbone input".to_string(),
            expected: config.in_channels,
            actual: backbone.in_channels(),
        });
    }
    let widths = backbone.out_channels();
    for (i, (&actual, &expected)) in widths.iter().zip(&config.encoder_channels).enumerate() {
        if actual != expected {
            return Err(MinetError::ChannelMismatch {
                operation: format!("backbone level {}", 1 << i),
                expected,
                actual,
            });
        }
    }
    Ok(())
}

impl Module for LightMINet {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        let mut children: Vec<(String, &dyn Module)> = vec![
            ("backbone".to_string(), self.backbone.as_module()),
            ("transform".to_string(), self.transform.as_ref() as &dyn Module),
        ];
        for (i, stage) in self.decoders.iter().enumerate() {
            children.push((format!("decoder{}", level_stride(i)), stage.as_ref() as &dyn Module));
        }
        children.push(("classifier".to_string(), &self.classifier as &dyn Module));
        children
    }
}

impl Layer for LightMINet {
    fn forward(&self, input: &Tensor) -> Result<Tensor, MinetError> {
        LightMINet::forward(self, input)
    }
}
