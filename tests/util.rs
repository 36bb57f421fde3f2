#![allow(dead_code)]

use std::sync::Arc;

use cakit::config::EngineConfig;
use cakit::engine::Engine;
use cakit::error::CaError;
use cakit::model::{Certificate, Subject};
use cakit::random::SeededRandom;
use cakit::store::MemoryStore;
use tokio_util::sync::CancellationToken;

pub const SECRET: &str = "test123";

/// Small keys keep key generation fast; never use them outside tests.
pub const TEST_KEY_BITS: usize = 512;

pub fn config(secret: &str, expose_ca_key: bool) -> EngineConfig {
    EngineConfig::builder()
        .secret(secret)
        .key_bits(TEST_KEY_BITS)
        .expose_ca_key(expose_ca_key)
        .random(Arc::new(SeededRandom::new(0x5eed)))
        .build()
}

pub fn engine() -> Engine<MemoryStore> {
    Engine::new(MemoryStore::new(), config(SECRET, false))
}

pub fn engine_on(store: MemoryStore, secret: &str, expose_ca_key: bool) -> Engine<MemoryStore> {
    Engine::new(store, config(secret, expose_ca_key))
}

pub fn root(name: &str, days: u32) -> Subject {
    Subject::builder().name(name).days(days).build()
}

pub fn issued(name: &str, days: u32, issuer: u64) -> Subject {
    Subject::builder().name(name).days(days).issuer(issuer).build()
}

pub async fn create(engine: &Engine<MemoryStore>, subject: Subject) -> Certificate {
    engine
        .create_certificate(subject, &CancellationToken::new())
        .await
        .unwrap()
}

pub fn kind(err: &CaError) -> &CaError {
    err.root_cause()
}
