use std::fs;

use tolgee_authz::config::{api_key_header_from_env, DEFAULT_PORT};

/// Writes the OpenAPI document to the path given as the first argument
/// (default `openapi.json`).
fn main() -> anyhow::Result<()> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "openapi.json".to_string());

    let doc = tolgee_authz::docs::build_openapi(DEFAULT_PORT, &api_key_header_from_env())?;
    fs::write(&path, serde_json::to_string_pretty(&doc)?)?;
    println!("wrote {}", path);
    Ok(())
}
