pub mod constants;
pub mod defaults;
pub mod dynamics;
pub mod error;
pub mod initialization;
pub mod interface;
pub mod output;

/// Complex double precision number used for the electronic density matrix
#[allow(non_camel_case_types)]
pub type c64 = num_complex::Complex64;

pub use error::{Result, SurfaceHoppingError};
