//! Core types for MixTune
pub mod session;
pub mod weights;
