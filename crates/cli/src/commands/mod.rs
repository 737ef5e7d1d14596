pub mod compare;
pub mod extract;
pub mod resolve;
pub mod status;

pub use compare::*;
pub use extract::*;
pub use resolve::*;
pub use status::*;
