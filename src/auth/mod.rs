pub mod keystore;
pub mod pubkey;

pub use keystore::KeyStore;
