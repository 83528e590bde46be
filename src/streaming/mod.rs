pub mod capped;
pub mod relay;

pub use capped::read_capped;
pub use relay::StreamRelay;
