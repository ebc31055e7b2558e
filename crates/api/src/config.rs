//! Types for use when configuring certnet modules.

use crate::*;

/// helper transcode function
fn tc<S: serde::Serialize, D: serde::de::DeserializeOwned>(
    s: &S,
) -> FetchResult<D> {
    serde_json::from_str(
        &serde_json::to_string(s)
            .map_err(|e| FetchError::other_src("encode", e))?,
    )
    .map_err(|e| FetchError::other_src("decode", e))
}

/// Denotes a type used to configure a specific certnet module.
///
/// Note, the types defined with this trait are specifically for
/// configuration that cannot be changed at runtime, the likes of which
/// might be found in a configuration file.
///
/// Serialization on a module config should be tolerant to missing
/// properties, setting sane defaults, because the config may be loaded
/// from disk and edited by humans.
pub trait ModConfig:
    'static
    + Sized
    + Default
    + std::fmt::Debug
    + serde::Serialize
    + serde::de::DeserializeOwned
    + Send
    + Sync
{
}

/// Certnet configuration.
///
/// This is a bag of per-module configuration. Each module factory
/// contributes its defaults via [Config::set_module_config] when the
/// builder generates a default configuration, and reads its section back
/// via [Config::get_module_config] when the module is created.
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Config(serde_json::Map<String, serde_json::Value>);

impl Config {
    /// Set (or overwrite) the configuration for a module.
    ///
    /// The top-level properties of the serialized module config are
    /// merged into this config map.
    pub fn set_module_config<M: ModConfig>(&mut self, m: &M) -> FetchResult<()> {
        let m: serde_json::Map<String, serde_json::Value> = tc(m)?;
        for (k, v) in m {
            self.0.insert(k, v);
        }
        Ok(())
    }

    /// Extract a module config from this config map.
    ///
    /// Modules that have no section present get their default config.
    pub fn get_module_config<M: ModConfig>(&self) -> FetchResult<M> {
        tc(&self.0)
    }
}
