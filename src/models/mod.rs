pub mod acknowledgement;
pub mod catalog;
pub mod enums;

pub use acknowledgement::*;
pub use catalog::*;
