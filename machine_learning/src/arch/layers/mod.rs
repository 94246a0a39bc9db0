mod batchnorm;
mod conv;
mod dense;
mod layer;
mod pool;
mod relu;
mod residual;

pub use batchnorm::BatchNorm2d;
pub use conv::Conv2d;
pub use dense::Dense;
pub use layer::Layer;
pub use pool::{GlobalAvgPool, MaxPool2d};
pub use relu::Relu;
pub use residual::Residual;
