use minet_core::MinetError;

use crate::NUM_LEVELS;

/// Widths and switches of a [`LightMINet`](crate::LightMINet).
///
/// Per-level arrays of the encoder side (`encoder_channels`,
/// `transform_channels`) are ordered finest first (strides 1, 2, 4, 8, 16).
/// Decoder-side arrays (`decoder_channels`, `sim_channels`) follow the decoding
/// order, coarsest first (levels 16, 8, 4, 2, 1).
#[derive(Debug, Clone, PartialEq)]
pub struct LightMINetConfig {
    pub in_channels: usize,
    pub encoder_channels: [usize; NUM_LEVELS],
    pub transform_channels: [usize; NUM_LEVELS],
    pub decoder_channels: [usize; NUM_LEVELS],
    /// Width of the low-resolution branch of each SIM.
    pub sim_channels: [usize; NUM_LEVELS],
    /// Selects the checkpointed forward pass for [`forward`](crate::LightMINet::forward).
    pub checkpointing: bool,
    pub seed: u64,
    pub bn_momentum: f32,
    pub bn_eps: f32,
    /// Input height and width must be multiples of this.
    pub input_multiple: usize,
}

impl Default for LightMINetConfig {
    fn default() -> Self {
        LightMINetConfig {
            in_channels: 3,
            encoder_channels: [64, 128, 256, 512, 512],
            transform_channels: [32, 64, 64, 64, 64],
            decoder_channels: [64, 64, 64, 32, 32],
            sim_channels: [32, 32, 32, 32, 16],
            checkpointing: false,
            seed: 0,
            bn_momentum: 0.1,
            bn_eps: 1e-5,
            input_multiple: 32,
        }
    }
}

impl LightMINetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Divides every channel width by `divisor` (never below 1).
    ///
    /// Keeps the architecture while making tests and demos cheap.
    pub fn scaled(mut self, divisor: usize) -> Self {
        let divisor = divisor.max(1);
        let shrink = |widths: &mut [usize; NUM_LEVELS]| {
            for w in widths.iter_mut() {
                *w = (*w / divisor).max(1);
            }
        };
        shrink(&mut self.encoder_channels);
        shrink(&mut self.transform_channels);
        shrink(&mut self.decoder_channels);
        shrink(&mut self.sim_channels);
        self
    }

    pub fn with_checkpointing(mut self, checkpointing: bool) -> Self {
        self.checkpointing = checkpointing;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_encoder_channels(mut self, channels: [usize; NUM_LEVELS]) -> Self {
        self.encoder_channels = channels;
        self
    }

    pub fn with_batch_norm(mut self, momentum: f32, eps: f32) -> Self {
        self.bn_momentum = momentum;
        self.bn_eps = eps;
        self
    }

    /// Input width of the decoder stage at decoding position `i` (0 = level 16).
    pub fn decoder_input_channels(&self, i: usize) -> usize {
        self.transform_channels[NUM_LEVELS - 1 - i]
    }

    /// Checks that every width is positive and that the decoder's fusions line up:
    /// the projection of decoder level `i` must match the transformed width of the
    /// next finer level it is upsampled into.
    pub fn validate(&self) -> Result<(), MinetError> {
        let all_widths = [
            ("encoder_channels", &self.encoder_channels),
            ("transform_channels", &self.transform_channels),
            ("decoder_channels", &self.decoder_channels),
            ("sim_channels", &self.sim_channels),
        ];
        for (name, widths) in all_widths {
            if widths.contains(&0) {
                return Err(MinetError::InvalidConfiguration(format!(
                    "{name} must be positive, got {widths:?}"
                )));
            }
        }
        if self.in_channels == 0 {
            return Err(MinetError::InvalidConfiguration(
                "in_channels must be positive".to_string(),
            ));
        }
        if self.input_multiple == 0 {
            return Err(MinetError::InvalidConfiguration(
                "input_multiple must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.bn_momentum) || self.bn_eps <= 0.0 {
            return Err(MinetError::InvalidConfiguration(format!(
                "batch norm momentum must be in [0, 1] and eps positive (got {}, {})",
                self.bn_momentum, self.bn_eps
            )));
        }
        for i in 0..NUM_LEVELS - 1 {
            let projected = self.decoder_channels[i];
            let lateral = self.decoder_input_channels(i + 1);
            if projected != lateral {
                return Err(MinetError::ChannelMismatch {
                    operation: format!("decoder fusion into level {}", level_stride(i + 1)),
                    expected: lateral,
                    actual: projected,
                });
            }
        }
        Ok(())
    }
}

/// Stride of decoding position `i` (0 -> 16, 4 -> 1).
pub(crate) fn level_stride(i: usize) -> usize {
    1 << (NUM_LEVELS - 1 - i)
}
