//! Core data types shared by the format adapters, decoders and the index.

pub mod item;
pub mod machine;
pub mod symbol;
