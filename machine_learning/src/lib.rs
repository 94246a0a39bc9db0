pub mod arch;
pub mod device;
pub mod error;
pub mod loss;
mod network;
pub mod optimization;
mod test;

pub use device::{Device, DeviceErr};
pub use error::{MlErr, Result};
pub use network::Network;
