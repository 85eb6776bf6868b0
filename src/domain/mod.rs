pub mod agent;
pub mod market;
pub mod message;
pub mod result;

pub use agent::*;
pub use market::*;
pub use message::*;
pub use result::*;
