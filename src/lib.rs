pub mod core;

pub use crate::core::payload::{DecodedStats, NodeStats, decode_js1_payload, encode_js1_payload};
pub use crate::core::{JobstatsError, JobstatsHandler};
