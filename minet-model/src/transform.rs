use log::debug;
use minet_core::nn::{BasicConv2d, BatchNorm2d, Conv2d, Conv2dOptions, Layer, Module};
use minet_core::{MinetError, Tensor};
use rand::rngs::StdRng;

use crate::NUM_LEVELS;

/// Fuses one pyramid level with its neighbours.
///
/// Every participating level is first projected to `mid` channels (the
/// narrowest participating width). The finer neighbour is average-pooled and
/// the coarser one bilinearly upsampled to the main level's size, each is
/// convolved, and the sum is normalized. A 1x1 identity path from the raw main
/// input is added before the final ReLU.
#[derive(Debug)]
pub struct AggregationUnit {
    finer: Option<(BasicConv2d, Conv2d)>,
    main: (BasicConv2d, Conv2d),
    coarser: Option<(BasicConv2d, Conv2d)>,
    fuse_bn: BatchNorm2d,
    out_conv: Conv2d,
    out_bn: BatchNorm2d,
    identity: Conv2d,
    in_channels: usize,
    out_channels: usize,
}

impl AggregationUnit {
    fn new(
        finer_in: Option<usize>,
        main_in: usize,
        coarser_in: Option<usize>,
        out_channels: usize,
        bn: (f32, f32),
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        let mid = [finer_in, Some(main_in), coarser_in]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(main_in);
        let opts = Conv2dOptions::same(3);
        let branch = |in_channels: usize, rng: &mut StdRng| -> Result<(BasicConv2d, Conv2d), MinetError> {
            Ok((
                BasicConv2d::new(in_channels, mid, 3, opts, bn.0, bn.1, rng)?,
                Conv2d::new(mid, mid, 3, opts, rng)?,
            ))
        };
        let finer = finer_in.map(|c| branch(c, rng)).transpose()?;
        let main = branch(main_in, rng)?;
        let coarser = coarser_in.map(|c| branch(c, rng)).transpose()?;
        Ok(AggregationUnit {
            finer,
            main,
            coarser,
            fuse_bn: BatchNorm2d::new(mid, bn.0, bn.1)?,
            out_conv: Conv2d::new(mid, out_channels, 3, opts, rng)?,
            out_bn: BatchNorm2d::new(out_channels, bn.0, bn.1)?,
            identity: Conv2d::new(main_in, out_channels, 1, Conv2dOptions::same(1), rng)?,
            in_channels: main_in,
            out_channels,
        })
    }

    pub fn forward(
        &self,
        finer: Option<&Tensor>,
        main: &Tensor,
        coarser: Option<&Tensor>,
    ) -> Result<Tensor, MinetError> {
        let [_, _, h, w] = main.dims4("AggregationUnit (main)")?;
        let (main_proj, main_mix) = &self.main;
        let mut fused = main_mix.forward(&main_proj.forward(main)?)?;

        if let (Some((proj, mix)), Some(finer)) = (&self.finer, finer) {
            let mut down = proj.forward(finer)?.avg_pool2d(2, 2)?;
            let [_, _, dh, dw] = down.dims4("AggregationUnit (finer)")?;
            if (dh, dw) != (h, w) {
                down = down.interpolate_bilinear(h, w)?;
            }
            fused = fused.add(&mix.forward(&down)?)?;
        }
        if let (Some((proj, mix)), Some(coarser)) = (&self.coarser, coarser) {
            let up = proj.forward(coarser)?.interpolate_bilinear(h, w)?;
            fused = fused.add(&mix.forward(&up)?)?;
        }
        let fused = self.fuse_bn.forward(&fused)?.relu()?;

        let out = self.out_bn.forward(&self.out_conv.forward(&fused)?)?;
        out.add(&self.identity.forward(main)?)?.relu()
    }
}

impl Module for AggregationUnit {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        let mut children: Vec<(String, &dyn Module)> = Vec::new();
        let branches = [("finer", self.finer.as_ref()), ("main", Some(&self.main)), ("coarser", self.coarser.as_ref())];
        for (name, branch) in branches {
            if let Some((proj, mix)) = branch {
                children.push((format!("{name}_proj"), proj));
                children.push((format!("{name}_mix"), mix));
            }
        }
        children.push(("fuse_bn".to_string(), &self.fuse_bn));
        children.push(("out_conv".to_string(), &self.out_conv));
        children.push(("out_bn".to_string(), &self.out_bn));
        children.push(("identity".to_string(), &self.identity));
        children
    }
}

/// Light Aggregate Interaction Module: maps the 5-level encoder pyramid to a
/// 5-level pyramid of (usually narrower) widths, level by level, preserving
/// spatial sizes.
#[derive(Debug)]
pub struct LightAim {
    units: Vec<AggregationUnit>,
}

impl LightAim {
    pub fn new(
        in_channels: [usize; NUM_LEVELS],
        out_channels: [usize; NUM_LEVELS],
        bn_momentum: f32,
        bn_eps: f32,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        let mut units = Vec::with_capacity(NUM_LEVELS);
        for i in 0..NUM_LEVELS {
            let finer = i.checked_sub(1).map(|j| in_channels[j]);
            let coarser = in_channels.get(i + 1).copied();
            units.push(AggregationUnit::new(
                finer,
                in_channels[i],
                coarser,
                out_channels[i],
                (bn_momentum, bn_eps),
                rng,
            )?);
        }
        debug!("LightAim: {in_channels:?} -> {out_channels:?}");
        Ok(LightAim { units })
    }

    pub fn in_channels(&self) -> [usize; NUM_LEVELS] {
        let mut widths = [0; NUM_LEVELS];
        for (w, unit) in widths.iter_mut().zip(&self.units) {
            *w = unit.in_channels;
        }
        widths
    }

    pub fn out_channels(&self) -> [usize; NUM_LEVELS] {
        let mut widths = [0; NUM_LEVELS];
        for (w, unit) in widths.iter_mut().zip(&self.units) {
            *w = unit.out_channels;
        }
        widths
    }

    /// Transforms all five levels at once (finest first).
    pub fn forward(&self, levels: &[Tensor]) -> Result<Vec<Tensor>, MinetError> {
        if levels.len() != NUM_LEVELS {
            return Err(MinetError::InvalidInputShape {
                shape: vec![levels.len()],
                reason: format!("LightAIM expects {NUM_LEVELS} pyramid levels"),
            });
        }
        for (i, (level, unit)) in levels.iter().zip(&self.units).enumerate() {
            let [_, channels, _, _] = level.dims4("LightAIM")?;
            if channels != unit.in_channels {
                return Err(MinetError::ChannelMismatch {
                    operation: format!("LightAIM level {}", 1 << i),
                    expected: unit.in_channels,
                    actual: channels,
                });
            }
        }
        self.units
            .iter()
            .enumerate()
            .map(|(i, unit)| {
                let finer = i.checked_sub(1).map(|j| &levels[j]);
                unit.forward(finer, &levels[i], levels.get(i + 1))
            })
            .collect()
    }
}

impl Module for LightAim {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        self.units
            .iter()
            .enumerate()
            .map(|(i, unit)| (format!("level{}", 1 << i), unit as &dyn Module))
            .collect()
    }
}
