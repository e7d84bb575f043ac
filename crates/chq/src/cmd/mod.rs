//! Command implementations for the chq CLI

pub mod flush;
pub mod pending;
pub mod serve;
