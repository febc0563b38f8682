pub mod aligner;
pub mod clip;
pub mod consts;
pub mod dataset;
pub mod filter;
pub mod image_io;
pub mod mapper;
pub mod primitives;
pub mod remap;
pub mod sampler;
pub mod transforms;

use lazy_static::lazy_static;

lazy_static! {
    static ref VERSION_CRC32: u32 = crc32fast::hash(env!("CARGO_PKG_VERSION").as_bytes());
}

pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_owned()
}

/// Returns version in CRC32 format
///
pub fn version_crc32() -> u32 {
    *VERSION_CRC32
}

pub fn fast_hash(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Derives a per-record seed so that records mapped on different workers
/// stay reproducible for a fixed base seed.
pub fn record_seed(base_seed: u64, record_id: &str, round: u64) -> u64 {
    let h = fast_hash(record_id.as_bytes()) as u64;
    base_seed ^ (h << 32) ^ round.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}
