//! Contraindication and substance-interaction alerting.
//!
//! Pipeline per evaluation: catalog snapshot, substance matching on the
//! plan text, condition inference from intake, rule evaluation, then the
//! acknowledgement ledger. [`AlertStreamController`] runs it and publishes
//! [`AlertSnapshot`]s.

pub mod catalog;
pub mod conditions;
pub mod controller;
pub mod evaluator;
pub mod keywords;
pub mod ledger;
pub mod matcher;
pub mod normalize;
pub mod retry;
pub mod types;

#[cfg(test)]
mod test_support;

pub use catalog::*;
pub use conditions::*;
pub use controller::*;
pub use evaluator::*;
pub use keywords::*;
pub use ledger::*;
pub use matcher::*;
pub use retry::*;
pub use types::*;
