use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "d_name")]
    pub name: String,
    #[serde(default = "d_version")]
    pub version: String,
    #[serde(default)]
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: d_name(),
            version: d_version(),
            debug: false,
        }
    }
}

fn d_name() -> String {
    "narrflow".into()
}

fn d_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}
