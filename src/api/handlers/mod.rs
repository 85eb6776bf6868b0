pub mod agents;
pub mod system;

pub use agents::*;
pub use system::*;
