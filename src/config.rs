use anyhow::Result;
use std::path::PathBuf;

const DEFAULT_API_BASE: &str = "http://localhost:4000/api";
const DEFAULT_STOREFRONT_URL: &str = "http://localhost:5173";

pub const DEFAULT_LOG_FILTER: &str = "sahli=info";

pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(".config")
        .join("sahli");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

pub fn credentials_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("credentials.json"))
}

/// Base API URL, fixed when the binary is built (`SAHLI_API_URL`).
pub fn api_base_url() -> String {
    trim_base(option_env!("SAHLI_API_URL").unwrap_or(DEFAULT_API_BASE))
}

/// Origin of the public web storefront, used for shareable shop links.
pub fn storefront_url() -> String {
    trim_base(option_env!("SAHLI_STOREFRONT_URL").unwrap_or(DEFAULT_STOREFRONT_URL))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
