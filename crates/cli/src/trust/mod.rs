//! Ed25519 key material for signed download URLs.

pub mod keygen;
