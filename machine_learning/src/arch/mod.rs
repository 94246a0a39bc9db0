mod init;
pub mod layers;
mod model;
mod params;
mod resnet;
mod sequential;

pub use init::Init;
pub use model::Model;
pub use resnet::{Architecture, ParseArchErr};
pub use sequential::Sequential;
