pub mod analysis;
pub mod creation;
pub mod detector;
pub mod pressure;
pub mod snapshot;
pub mod suspect;

pub use analysis::*;
pub use creation::*;
pub use detector::*;
pub use pressure::*;
pub use snapshot::*;
pub use suspect::*;
