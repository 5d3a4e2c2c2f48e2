pub use coupling_processing::*;
pub use dynamic_routines::*;
pub use engine::*;
pub use hopping_routines::*;
pub use schroedinger_integration::*;
pub use simulation::*;
pub use velocity_adjustment::*;

pub mod coupling_processing;
pub mod dynamic_routines;
pub mod engine;
pub mod hopping_routines;
pub mod schroedinger_integration;
pub mod simulation;
pub mod velocity_adjustment;
