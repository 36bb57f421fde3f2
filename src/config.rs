//! Engine configuration.

use std::sync::Arc;

use bon::Builder;
use time::Duration;

use crate::key::DEFAULT_KEY_BITS;
use crate::random::{OsRandom, RandomSource};

/// Configuration for the CA engine.
#[derive(Clone, Builder)]
pub struct EngineConfig {
    /// Operator secret protecting private keys at rest. Empty is accepted
    /// but logged as a warning.
    #[builder(default, into)]
    pub secret: String,
    /// RSA modulus size for new keys (default: 2048).
    #[builder(default = DEFAULT_KEY_BITS)]
    pub key_bits: usize,
    /// Allow `get_private_key` to return CA keys (default: false).
    #[builder(default)]
    pub expose_ca_key: bool,
    /// Window in which a certificate counts as soon expiring (default: 30 days).
    #[builder(default = Duration::days(30))]
    pub soon_window: Duration,
    /// Entropy for keys, serials and signatures.
    #[builder(default = Arc::new(OsRandom) as Arc<dyn RandomSource>)]
    pub random: Arc<dyn RandomSource>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("secret", &if self.secret.is_empty() { "<empty>" } else { "<redacted>" })
            .field("key_bits", &self.key_bits)
            .field("expose_ca_key", &self.expose_ca_key)
            .field("soon_window", &self.soon_window)
            .finish_non_exhaustive()
    }
}
