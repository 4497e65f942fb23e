use minet_core::nn::{BatchNorm2d, Conv2d, Conv2dOptions, Layer, Module};
use minet_core::{MinetError, Tensor};
use rand::rngs::StdRng;

/// Scale Interaction Module.
///
/// Splits the input into a full-resolution branch (`h` channels, same as the
/// input) and a half-resolution branch (`l` channels), lets them exchange
/// information once, and merges them back at full resolution:
///
/// ```text
/// xh  = relu(bn(conv(x)))               xl  = relu(bn(conv(pool(x))))
/// xh' = relu(bn(conv(xh) + conv(up(xl))))
/// xl' = relu(bn(conv(xl) + conv(pool(xh))))
/// out = relu(bn(conv(xh') + conv(up(xl')))) + x
/// ```
///
/// Shape-preserving. The decoder applies it as `SIM(x) + x`.
#[derive(Debug)]
pub struct Sim {
    h2h_0: Conv2d,
    h2l_0: Conv2d,
    bnh_0: BatchNorm2d,
    bnl_0: BatchNorm2d,
    h2h_1: Conv2d,
    h2l_1: Conv2d,
    l2h_1: Conv2d,
    l2l_1: Conv2d,
    bnh_1: BatchNorm2d,
    bnl_1: BatchNorm2d,
    h2h_2: Conv2d,
    l2h_2: Conv2d,
    bnh_2: BatchNorm2d,
    channels: usize,
}

impl Sim {
    pub fn new(
        channels: usize,
        low_channels: usize,
        bn_momentum: f32,
        bn_eps: f32,
        rng: &mut StdRng,
    ) -> Result<Self, MinetError> {
        let (h, l) = (channels, low_channels);
        let opts = Conv2dOptions::same(3);
        let bn = |c: usize| BatchNorm2d::new(c, bn_momentum, bn_eps);
        Ok(Sim {
            h2h_0: Conv2d::new(h, h, 3, opts, rng)?,
            h2l_0: Conv2d::new(h, l, 3, opts, rng)?,
            bnh_0: bn(h)?,
            bnl_0: bn(l)?,
            h2h_1: Conv2d::new(h, h, 3, opts, rng)?,
            h2l_1: Conv2d::new(h, l, 3, opts, rng)?,
            l2h_1: Conv2d::new(l, h, 3, opts, rng)?,
            l2l_1: Conv2d::new(l, l, 3, opts, rng)?,
            bnh_1: bn(h)?,
            bnl_1: bn(l)?,
            h2h_2: Conv2d::new(h, h, 3, opts, rng)?,
            l2h_2: Conv2d::new(l, h, 3, opts, rng)?,
            bnh_2: bn(h)?,
            channels,
        })
    }

    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl Module for Sim {
    fn named_children(&self) -> Vec<(String, &dyn Module)> {
        let children: [(&str, &dyn Module); 13] = [
            ("h2h_0", &self.h2h_0),
            ("h2l_0", &self.h2l_0),
            ("bnh_0", &self.bnh_0),
            ("bnl_0", &self.bnl_0),
            ("h2h_1", &self.h2h_1),
            ("h2l_1", &self.h2l_1),
            ("l2h_1", &self.l2h_1),
            ("l2l_1", &self.l2l_1),
            ("bnh_1", &self.bnh_1),
            ("bnl_1", &self.bnl_1),
            ("h2h_2", &self.h2h_2),
            ("l2h_2", &self.l2h_2),
            ("bnh_2", &self.bnh_2),
        ];
        children
            .into_iter()
            .map(|(name, m)| (name.to_string(), m))
            .collect()
    }
}

impl Layer for Sim {
    fn forward(&self, x: &Tensor) -> Result<Tensor, MinetError> {
        let [_, _, h, w] = x.dims4("SIM")?;

        let x_h = self.bnh_0.forward(&self.h2h_0.forward(x)?)?.relu()?;
        let x_l = self.bnl_0.forward(&self.h2l_0.forward(&x.avg_pool2d(2, 2)?)?)?.relu()?;

        let h2h = self.h2h_1.forward(&x_h)?;
        let h2l = self.h2l_1.forward(&x_h.avg_pool2d(2, 2)?)?;
        let l2l = self.l2l_1.forward(&x_l)?;
        let l2h = self.l2h_1.forward(&x_l.interpolate_bilinear(h, w)?)?;
        let x_h = self.bnh_1.forward(&h2h.add(&l2h)?)?.relu()?;
        let x_l = self.bnl_1.forward(&l2l.add(&h2l)?)?.relu()?;

        let h2h = self.h2h_2.forward(&x_h)?;
        let l2h = self.l2h_2.forward(&x_l.interpolate_bilinear(h, w)?)?;
        let x_h = self.bnh_2.forward(&h2h.add(&l2h)?)?.relu()?;
        x_h.add(x)
    }
}
