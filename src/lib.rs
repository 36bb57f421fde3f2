//! # CAKit - A Private Certificate Authority Engine
//!
//! CAKit issues, renews, revokes and tracks X.509 certificates organized in a
//! trust hierarchy of any depth. It is built entirely with rustcrypto
//! libraries: RSA keys, certificates and revocation lists are produced without
//! ring or openssl (openssl is only used to check the output in tests).
//!
//! ## Key Features
//!
//! - **Hierarchies**: self-signed roots, intermediate CAs and leaf
//!   certificates, with issuer validation on every issuance
//! - **Idempotent creation**: creating the same name under the same issuer
//!   returns the existing certificate
//! - **Cascading renewal**: renewing a CA renews every active certificate it
//!   issued, keeping each one's remaining lifetime
//! - **Revocation**: tombstoned rows and signed CRLs per issuer
//! - **Keys at rest**: private keys are stored AES-256-CFB encrypted under an
//!   operator secret
//! - **Bulk import**: YAML/JSON certificate trees from a directory
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cakit::{
//!     config::EngineConfig,
//!     engine::Engine,
//!     model::Subject,
//!     store::MemoryStore,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), cakit::error::CaError> {
//! let engine = Engine::new(
//!     MemoryStore::new(),
//!     EngineConfig::builder().secret("s3cr3t").build(),
//! );
//! let cancel = CancellationToken::new();
//!
//! // A root is always a CA
//! let root = engine
//!     .create_certificate(Subject::builder().name("My Root CA").days(3650).build(), &cancel)
//!     .await?;
//!
//! // A server certificate signed by the root
//! let server = engine
//!     .create_certificate(
//!         Subject::builder()
//!             .name("server.example.com")
//!             .days(365)
//!             .issuer(root.id)
//!             .ips(vec!["10.0.0.10".to_string()])
//!             .build(),
//!         &cancel,
//!     )
//!     .await?;
//!
//! let cert_pem = engine.get_public_cert(server.id, &cancel).await?;
//! let key_pem = engine.get_private_key(server.id, &cancel).await?;
//!
//! // Revoke and publish the revocation list of the root
//! engine.revoke_certificate(server.id, &cancel).await?;
//! let crl_pem = engine.get_revoked_certificates_list(root.id, &cancel).await?;
//! # let _ = (cert_pem, key_pem, crl_pem);
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Engine errors are wrapped in stages naming the step that failed; match on
//! [`error::CaError::root_cause`] to get the kind:
//!
//! ```rust
//! use cakit::error::{CaError, ResultExt};
//!
//! let result: Result<(), CaError> = Err(CaError::NotIssuerNotCA);
//! let err = result.stage("validate issuer").unwrap_err();
//! assert!(matches!(err.root_cause(), CaError::NotIssuerNotCA));
//! assert!(err.is_client_error());
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`]: Certificate lifecycle operations
//! - [`store`]: Storage traits and the in-memory store
//! - [`forge`]: Key generation, signing and sealing of one certificate
//! - [`import`]: Bulk import from YAML/JSON files
//! - [`model`]: Data exchanged with callers
//! - [`config`]: Engine configuration
//! - [`cert`]: Certificate encoding, decoding and extensions
//! - [`crl`]: Certificate revocation lists
//! - [`issuer`]: Certificate issuing functionality
//! - [`key`]: RSA key generation, import/export and signatures
//! - [`cipher`]: Encryption of private keys at rest
//! - [`serial`]: Serial numbers
//! - [`random`]: Randomness sources
//! - [`error`]: Error types and stage wrapping
//! - [`tbs_certificate`]: Low-level certificate structure manipulation

pub mod cert;
pub mod cipher;
pub mod config;
pub mod crl;
pub mod engine;
pub mod error;
pub mod forge;
pub mod import;
pub mod issuer;
pub mod key;
pub mod model;
mod pem_utils;
pub mod random;
pub mod serial;
pub mod store;
pub mod tbs_certificate;
