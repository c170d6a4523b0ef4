// Common test utilities

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::*;
