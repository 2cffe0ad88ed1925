pub mod aggregate;
pub mod billing;
pub mod clinic;

pub use aggregate::*;
pub use billing::*;
pub use clinic::*;
