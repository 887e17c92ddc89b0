pub mod analyzer;
pub mod patterns;
pub mod prediction;
pub mod risk;
pub mod sample;
pub mod trend;

pub use analyzer::*;
pub use patterns::*;
pub use prediction::*;
pub use risk::*;
pub use sample::*;
pub use trend::*;
