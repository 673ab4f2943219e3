use serde::{Deserialize, Serialize};

/// How the two seats are hosted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    /// One manager owning both seats.
    #[default]
    Local,
    /// A master and a mirror joined by a simulated link.
    Networked,
}

impl std::str::FromStr for SimMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "networked" => Ok(Self::Networked),
            other => Err(format!("unknown sim mode '{other}'")),
        }
    }
}

/// Runner configuration, loaded from `CURLING_SIM_CONFIG` with environment overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub mode: SimMode,
    /// Seeds the bots and the link's loss decisions.
    pub seed: u64,
    /// One-way link delay.
    pub latency_ms: u64,
    /// Fraction of snapshots the link drops. Reliable messages always arrive.
    pub loss: f64,
    /// Tick on the wall clock instead of virtual time.
    pub realtime: bool,
    /// Give up after this much match time.
    pub max_match_secs: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            mode: SimMode::Local,
            seed: 1,
            latency_ms: 60,
            loss: 0.05,
            realtime: false,
            max_match_secs: 7200.0,
        }
    }
}

impl SimConfig {
    pub fn load() -> Self {
        let mut config = std::env::var("CURLING_SIM_CONFIG")
            .ok()
            .and_then(|path| Self::from_file(&path))
            .unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    fn from_file(path: &str) -> Option<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path, error = %e, "Cannot read sim config");
                return None;
            },
        };
        match toml::from_str::<Self>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path, error = %e, "Ignoring malformed sim config");
                None
            },
        }
    }

    /// Apply `CURLING_SIM_*` overrides; unparsable values are logged and skipped.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                tracing::warn!(key, value = %raw, "Ignoring unparsable override");
            }
            parsed
        }

        if let Some(mode) = parse("CURLING_SIM_MODE", lookup("CURLING_SIM_MODE")) {
            self.mode = mode;
        }
        if let Some(seed) = parse("CURLING_SIM_SEED", lookup("CURLING_SIM_SEED")) {
            self.seed = seed;
        }
        if let Some(latency) = parse("CURLING_SIM_LATENCY_MS", lookup("CURLING_SIM_LATENCY_MS")) {
            self.latency_ms = latency;
        }
        if let Some(loss) = parse::<f64>("CURLING_SIM_LOSS", lookup("CURLING_SIM_LOSS")) {
            self.loss = loss.clamp(0.0, 1.0);
        }
    }
}
