use serde::{Deserialize, Serialize};

use crate::descriptor::reference;

pub const DEFAULT_ENDPOINT: &str = "/";
pub const DEFAULT_ASSETS: &str = "/assets";

/// Where the engine talks to and loads from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// URL every navigation request is posted to.
    pub endpoint: String,
    /// Base URL of design assets.
    pub assets: String,
    /// Reference requested by `start`.
    pub entry: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_owned(),
            assets: DEFAULT_ASSETS.to_owned(),
            entry: reference::DEFAULT.to_owned(),
        }
    }
}

impl Config {
    /// `{assets}/{design}/{icon}.ico`, or `{assets}/{icon}.ico` before any
    /// design is known.
    pub fn icon_href(&self, design: Option<&str>, icon: &str) -> String {
        match design {
            Some(design) => format!("{}/{design}/{icon}.ico", self.assets_base()),
            None => format!("{}/{icon}.ico", self.assets_base()),
        }
    }

    pub fn stylesheet_href(&self, design: &str) -> String {
        format!("{}/{design}/theme.css", self.assets_base())
    }

    fn assets_base(&self) -> &str {
        self.assets.trim_end_matches('/')
    }
}

pub fn theme_class(theme: &str) -> String {
    format!("theme-{theme}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asset_locations() {
        let config = Config::default();

        assert_eq!(config.icon_href(Some("lcars"), "favicon"), "/assets/lcars/favicon.ico");
        assert_eq!(config.icon_href(None, "favicon"), "/assets/favicon.ico");
        assert_eq!(config.stylesheet_href("lcars"), "/assets/lcars/theme.css");
        assert_eq!(theme_class("dark"), "theme-dark");
    }

    #[test]
    fn trailing_slash_in_assets_is_ignored() {
        let config = Config {
            assets: "https://cdn.example.com/static/".to_owned(),
            ..Config::default()
        };
        assert_eq!(config.stylesheet_href("retro"), "https://cdn.example.com/static/retro/theme.css");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"endpoint": "/vm"}"#).unwrap();

        assert_eq!(config.endpoint, "/vm");
        assert_eq!(config.assets, "/assets");
        assert_eq!(config.entry, "@default");
    }
}
