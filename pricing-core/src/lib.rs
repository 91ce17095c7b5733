pub mod common;
pub mod domain;
pub mod storage;

pub use domain::*;
