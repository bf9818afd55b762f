//! Optimizing passes and the analyses that drive them.

pub mod alias;
pub mod dce;
pub mod dead_store;
pub mod licm;
pub mod liveness;
pub mod lvn;

pub use alias::AliasAnalysis;
pub use liveness::live_variables;
