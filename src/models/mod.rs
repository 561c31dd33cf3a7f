pub mod entities;
pub mod facts;

pub use entities::*;
pub use facts::*;
