//! Signing keys: the keypair store and registration with the external store

pub mod registrar;
pub mod store;

pub use registrar::{HttpStoreRegistrar, RegistrarError, RegistrationResult, StoreCredentials, StoreRegistrar};
pub use store::{KeyMaterial, KeypairError, KeypairInfo, KeypairStatus, KeypairStore};
