use std::{error::Error, fmt, str::FromStr};

use super::{
    Sequential,
    layers::{Layer, Residual},
};

const STAGE_PLANES: [usize; 4] = [64, 128, 256, 512];

/// The residual network family.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    ResNet18,
    ResNet34,
    #[default]
    ResNet50,
    ResNet101,
    ResNet152,
}

impl Architecture {
    pub const ALL: [Self; 5] = [
        Self::ResNet18,
        Self::ResNet34,
        Self::ResNet50,
        Self::ResNet101,
        Self::ResNet152,
    ];

    /// Amount of residual blocks on each of the four stages.
    fn blocks(self) -> [usize; 4] {
        match self {
            Self::ResNet18 => [2, 2, 2, 2],
            Self::ResNet34 | Self::ResNet50 => [3, 4, 6, 3],
            Self::ResNet101 => [3, 4, 23, 3],
            Self::ResNet152 => [3, 8, 36, 3],
        }
    }

    fn is_bottleneck(self) -> bool {
        !matches!(self, Self::ResNet18 | Self::ResNet34)
    }

    /// Builds the network for `num_classes` output classes.
    ///
    /// The stem is a 7x7 stride 2 convolution followed by a 3x3 stride 2 max pool, then four
    /// stages of residual blocks where every stage but the first halves the resolution on its
    /// first block. The head is a global average pool and a fully connected layer.
    pub fn build(self, num_classes: usize) -> Sequential {
        let mut layers = vec![
            Layer::conv(3, 64, 7, 2),
            Layer::batch_norm(64),
            Layer::relu(),
            Layer::max_pool(3, 2, 1),
        ];

        let mut in_channels = 64;
        for (stage, (planes, blocks)) in STAGE_PLANES.into_iter().zip(self.blocks()).enumerate() {
            for block in 0..blocks {
                let stride = if stage > 0 && block == 0 { 2 } else { 1 };
                let residual = if self.is_bottleneck() {
                    Residual::bottleneck(in_channels, planes, stride)
                } else {
                    Residual::basic(in_channels, planes, stride)
                };

                in_channels = residual.out_channels();
                layers.push(Layer::residual(residual));
            }
        }

        layers.push(Layer::global_avg_pool());
        layers.push(Layer::dense((in_channels, num_classes)));
        Sequential::new(layers)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ResNet18 => "resnet18",
            Self::ResNet34 => "resnet34",
            Self::ResNet50 => "resnet50",
            Self::ResNet101 => "resnet101",
            Self::ResNet152 => "resnet152",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseArchErr(pub String);

impl fmt::Display for ParseArchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known: Vec<_> = Architecture::ALL.iter().map(|a| a.name()).collect();
        write!(
            f,
            "unknown architecture `{}`, expected one of: {}",
            self.0,
            known.join(", ")
        )
    }
}

impl Error for ParseArchErr {}

impl FromStr for Architecture {
    type Err = ParseArchErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|arch| arch.name() == lower)
            .ok_or_else(|| ParseArchErr(s.to_string()))
    }
}
