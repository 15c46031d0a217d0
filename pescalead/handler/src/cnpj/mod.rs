//! Brazilian company registry: record decoding, location parsing and the
//! prospecting search builder.

pub mod filters;
pub mod location;
pub mod normalizer;
pub mod search;
