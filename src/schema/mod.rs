mod field;
pub use field::*;

mod primitives;
pub use primitives::*;

mod array;
pub use array::*;

mod object;
pub use object::*;

#[allow(clippy::module_inception)]
mod schema;
pub use schema::*;
