#[allow(clippy::module_inception)]
mod tool;
pub use tool::*;

mod surface;
pub use surface::*;
