use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::authz::API_KEY_PREFIX;

const API_KEY_SECRET_BYTES: usize = 24;

/// Hex-encoded SHA-256 of a raw API key; only this form is ever stored.
pub fn hash_api_key(raw_key: &str) -> String {
    hex::encode(Sha256::digest(raw_key.as_bytes()))
}

/// Generates a fresh project API key such as `tgpak_3f9c…`.
pub fn generate_api_key() -> String {
    let mut secret = [0u8; API_KEY_SECRET_BYTES];
    OsRng.fill_bytes(&mut secret);
    format!("{API_KEY_PREFIX}{}", hex::encode(secret))
}

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}
