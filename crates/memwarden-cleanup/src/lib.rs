pub mod actions;
pub mod manager;
pub mod schedule;
pub mod strategy;
pub mod targets;

pub use actions::*;
pub use manager::*;
pub use schedule::*;
pub use strategy::*;
pub use targets::*;
