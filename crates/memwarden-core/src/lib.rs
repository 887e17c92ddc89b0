pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod stats;
pub mod types;

pub use clock::*;
pub use config::*;
pub use error::*;
pub use logging::init_tracing;
pub use platform::*;
pub use types::*;
