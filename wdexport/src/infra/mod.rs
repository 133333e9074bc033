//! Concrete implementations of the instance-side contracts.

pub mod instances;
pub mod locker;
pub mod stack;

pub use instances::SqlInstances;
pub use locker::SqlLocker;
pub use stack::ComposeStack;
