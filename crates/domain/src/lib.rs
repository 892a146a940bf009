pub mod entities;
pub mod messaging;
pub mod value_objects;

pub use entities::*;
pub use messaging::*;
pub use tracker_errors::{TrackerError, TrackerResult};
pub use value_objects::*;
