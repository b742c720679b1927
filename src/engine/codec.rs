//! Optional block-level compression hook (§6 `block_codec`).
//!
//! The core engine never picks a compression algorithm; it consumes one
//! at the single boundary where a value's bytes cross into or out of an
//! SSTable. [`IdentityCodec`] is the default, a no-op pass-through, so
//! the engine works unchanged with no codec configured.

use std::fmt;
use std::sync::Arc;

/// Encodes and decodes a single value's bytes for on-disk storage. An
/// implementation may compress, encrypt, or leave bytes untouched; the
/// only contract is `decode(encode(bytes)) == bytes`.
pub trait BlockCodec: Send + Sync {
    fn encode(&self, bytes: &[u8]) -> Vec<u8>;
    fn decode(&self, bytes: &[u8]) -> Vec<u8>;
}

impl fmt::Debug for dyn BlockCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn BlockCodec")
    }
}

/// No-op codec: values are stored exactly as given. The default for
/// [`crate::engine::EngineConfig`].
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityCodec;

impl BlockCodec for IdentityCodec {
    fn encode(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    fn decode(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }
}

pub(crate) fn default_codec() -> Arc<dyn BlockCodec> {
    Arc::new(IdentityCodec)
}
