//! Agent configuration: logging, catalog objects and the services to run.
//!
//! ```json
//! {
//!   // comments are allowed
//!   "log": { "level": "info", "json": true },
//!   "objects": [
//!     { "name": "scenarios", "descriptor": { "clsid": "0x4F2C7A91", "scenarios": {} } }
//!   ],
//!   "services": ["scenarios"]
//! }
//! ```

use crate::error::{Error, Result};
use crate::variant::{json, Variant};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Logging
    pub log: LogConfig,
    /// Objects created at start-up and published in the catalog, in order
    pub objects: Vec<ObjectConfig>,
    /// Catalog names of services started in order and stopped in reverse
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub name: String,
    /// `{"clsid": .., ...creation config}`
    pub descriptor: serde_json::Value,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl AgentConfig {
    /// Load from JSON file if present and valid; otherwise return default
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }

    pub fn try_load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).context(format!("can't read {}", path.display())))?;
        Self::parse(&text)
    }

    /// Parse configuration text; `//` and `/* */` comments are allowed
    pub fn parse(text: &str) -> Result<Self> {
        let stripped = json::strip_comments(text)?;
        Ok(serde_json::from_str(&stripped)?)
    }

    /// Object descriptors as variants, in declaration order
    pub fn object_descriptors(&self) -> Result<Vec<(String, Variant)>> {
        self.objects
            .iter()
            .map(|object| {
                let descriptor = json::from_json_value(object.descriptor.clone())
                    .map_err(|e| e.context(format!("object <{}>", object.name)))?;
                Ok((object.name.clone(), descriptor))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = AgentConfig::load(Path::new("nonexistent.json"));
        assert_eq!(c.log.level, "info");
        assert!(c.log.json);
        assert!(c.objects.is_empty() && c.services.is_empty());
    }

    #[test]
    fn test_parse_with_comments() {
        let c = AgentConfig::parse(
            r#"{
                // human readable logs
                "log": { "json": false },
                "objects": [ { "name": "m", "descriptor": { "clsid": "0x4F2C7A91" } } ],
                /* start it */
                "services": ["m"]
            }"#,
        )
        .unwrap();
        assert!(!c.log.json);
        assert_eq!(c.log.level, "info");
        assert_eq!(c.services, vec!["m".to_string()]);

        let descriptors = c.object_descriptors().unwrap();
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].0, "m");
        assert_eq!(descriptors[0].1.get_or("clsid", ""), "0x4F2C7A91");
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(AgentConfig::parse("{ \"log\": "), Err(Error::InvalidFormat(_))));
        assert!(matches!(AgentConfig::parse("{ \"services\": 5 }"), Err(Error::InvalidFormat(_))));
    }
}
