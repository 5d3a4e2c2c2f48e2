pub use io::*;
pub use system::*;
pub use trajectory::*;
pub use velocities::*;

pub mod io;
pub mod system;
pub mod trajectory;
pub mod velocities;
