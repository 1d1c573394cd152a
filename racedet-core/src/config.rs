use std::env;

/// Runtime configuration read from environment variables (§6.3). There is
/// no CLI or config-file surface: the engine is a library plus a thin ABI
/// shim, not a standalone executable.
#[derive(Debug, Clone)]
pub struct Config {
    /// `CILKSCALE_OUT`: path to write race reports to. `None` means
    /// stdout.
    pub out_path: Option<String>,
    /// `CILKSCALE_READS`: whether to track reads (`SR`/`PR`) in addition
    /// to writes.
    pub track_reads: bool,
    /// `CILKSCALE_ABORT_ON_RACE`: escalate the first reported race to a
    /// fatal abort instead of reporting and continuing.
    pub abort_on_race: bool,
}

fn truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            out_path: env::var("CILKSCALE_OUT").ok(),
            track_reads: env::var("CILKSCALE_READS")
                .map(|v| truthy(&v))
                .unwrap_or(false),
            abort_on_race: env::var("CILKSCALE_ABORT_ON_RACE")
                .map(|v| truthy(&v))
                .unwrap_or(false),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            out_path: None,
            track_reads: false,
            abort_on_race: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_accepts_the_documented_spellings() {
        for v in ["1", "true", "TRUE", "True", "yes", "YES"] {
            assert!(truthy(v), "{v} should be truthy");
        }
        for v in ["0", "false", "no", "", "nah"] {
            assert!(!truthy(v), "{v} should not be truthy");
        }
    }

    #[test]
    fn default_config_tracks_writes_only_and_reports_to_stdout() {
        let c = Config::default();
        assert!(c.out_path.is_none());
        assert!(!c.track_reads);
        assert!(!c.abort_on_race);
    }
}
