//! Request handlers.

pub mod health;
pub mod recordings;
pub mod sensor;
pub mod settings;

pub use health::*;
pub use recordings::*;
pub use sensor::*;
pub use settings::*;
