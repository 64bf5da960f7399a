use smartstring::{
  LazyCompact,
  SmartString,
};

pub mod filter;
pub mod history;
pub mod hunk;
pub mod marker;
pub mod merged;
pub mod protocol;
pub mod session;
pub mod transaction;
pub mod transform;

pub type Tendril = SmartString<LazyCompact>;
