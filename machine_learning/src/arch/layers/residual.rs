use ndarray::Array4;
use rand::Rng;

use super::{Layer, Relu};
use crate::{MlErr, Result, arch::Sequential};

/// A residual block: `relu(main(x) + shortcut(x))`, where the shortcut is the identity unless the
/// block changes the resolution or the amount of channels.
///
/// Parameters are laid out as the main path followed by the shortcut.
#[derive(Debug, Clone)]
pub struct Residual {
    main: Sequential,
    shortcut: Option<Sequential>,
    relu: Relu,
    out_channels: usize,
}

impl Residual {
    /// The 3x3 then 3x3 block used by the shallow networks.
    pub const BASIC_EXPANSION: usize = 1;
    /// The 1x1, 3x3, 1x1 block used by the deep networks.
    pub const BOTTLENECK_EXPANSION: usize = 4;

    pub fn basic(in_channels: usize, planes: usize, stride: usize) -> Self {
        let out_channels = planes * Self::BASIC_EXPANSION;
        let main = Sequential::new([
            Layer::conv(in_channels, planes, 3, stride),
            Layer::batch_norm(planes),
            Layer::relu(),
            Layer::conv(planes, out_channels, 3, 1),
            Layer::batch_norm(out_channels),
        ]);

        Self::with_shortcut(main, in_channels, out_channels, stride)
    }

    /// Bottleneck with the stride on the 3x3 convolution.
    pub fn bottleneck(in_channels: usize, planes: usize, stride: usize) -> Self {
        let out_channels = planes * Self::BOTTLENECK_EXPANSION;
        let main = Sequential::new([
            Layer::conv(in_channels, planes, 1, 1),
            Layer::batch_norm(planes),
            Layer::relu(),
            Layer::conv(planes, planes, 3, stride),
            Layer::batch_norm(planes),
            Layer::relu(),
            Layer::conv(planes, out_channels, 1, 1),
            Layer::batch_norm(out_channels),
        ]);

        Self::with_shortcut(main, in_channels, out_channels, stride)
    }

    fn with_shortcut(
        main: Sequential,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        let shortcut = (stride != 1 || in_channels != out_channels).then(|| {
            Sequential::new([
                Layer::conv(in_channels, out_channels, 1, stride),
                Layer::batch_norm(out_channels),
            ])
        });

        Self {
            main,
            shortcut,
            relu: Relu::new(),
            out_channels,
        }
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn size(&self) -> usize {
        self.main.size() + self.shortcut.as_ref().map_or(0, Sequential::size)
    }

    pub fn init<R: Rng + ?Sized>(&self, params: &mut [f32], rng: &mut R) -> Result<()> {
        let (main, shortcut) = self.split_mut(params)?;
        self.main.init_params(main, rng)?;

        if let Some(seq) = &self.shortcut {
            seq.init_params(shortcut, rng)?;
        }

        Ok(())
    }

    pub fn forward(&mut self, params: &[f32], x: Array4<f32>) -> Result<Array4<f32>> {
        let (main_params, shortcut_params) = self.split(params)?;

        let identity = match &mut self.shortcut {
            Some(seq) => seq.forward_maps(shortcut_params, x.clone())?,
            None => x.clone(),
        };

        let mut y = self.main.forward_maps(main_params, x)?;
        if y.shape() != identity.shape() {
            return Err(MlErr::ShapeMismatch {
                what: "residual shortcut",
                got: identity.shape().to_vec(),
                expected: y.shape().to_vec(),
            });
        }

        y += &identity;
        Ok(self.relu.forward(y))
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array4<f32>,
    ) -> Result<Array4<f32>> {
        let (main_params, shortcut_params) = self.split(params)?;
        let main_len = main_params.len();
        let (main_grad, shortcut_grad) = grad.split_at_mut(main_len);

        let d = self.relu.backward(d)?;
        let d_identity = match &mut self.shortcut {
            Some(seq) => seq.backward_maps(shortcut_params, shortcut_grad, d.clone())?,
            None => d.clone(),
        };

        let mut dx = self.main.backward_maps(main_params, main_grad, d)?;
        dx += &d_identity;
        Ok(dx)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "residual params",
                got: len,
                expected: self.size(),
            });
        }

        Ok(())
    }

    fn split<'a>(&self, params: &'a [f32]) -> Result<(&'a [f32], &'a [f32])> {
        self.check_len(params.len())?;
        Ok(params.split_at(self.main.size()))
    }

    fn split_mut<'a>(&self, params: &'a mut [f32]) -> Result<(&'a mut [f32], &'a mut [f32])> {
        self.check_len(params.len())?;
        Ok(params.split_at_mut(self.main.size()))
    }
}
