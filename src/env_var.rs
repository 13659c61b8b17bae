use std::sync::OnceLock;

use serde::Deserialize;

fn default_deadlock_timeout() -> f64 {
    600.0
}

fn default_dissemination_factor() -> usize {
    2
}

fn default_backend() -> String {
    "local".to_owned()
}

fn default_num_pes() -> usize {
    1
}

fn default_distribution() -> String {
    "b".to_owned()
}

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Seconds a PE may wait inside a collective before a potential deadlock is reported, default: 600.0 seconds
    #[serde(default = "default_deadlock_timeout")]
    pub deadlock_timeout: f64,

    /// The dissemination factor for the n-way barrier, default: 2
    #[serde(default = "default_dissemination_factor")]
    pub barrier_dissemination_factor: usize,

    /// flag used to print warnings when a collective appears stalled. Default: true
    pub deadlock_warning: Option<bool>,

    /// The communication backend to use
    /// local -- single pe execution, the default
    /// channel -- multi pe execution, one thread per pe within this process
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of pes launched by the channel backend when not set explicitly on the builder, default: 1
    #[serde(default = "default_num_pes")]
    pub num_pes: usize,

    /// Distribution token used by factory helpers that are not given one, default: "b"
    #[serde(default = "default_distribution")]
    pub distribution: String,
}

/// Get the current Environment Variable configuration
pub fn config() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(|| match envy::prefixed("DISTARRAY_").from_env::<Config>() {
        Ok(config) => config,
        Err(error) => panic!("{}", error),
    })
}
