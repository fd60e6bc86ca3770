//! Configuration for the NAC mosaic pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the pipeline.
///
/// Every section has defaults, so an empty file (or no file at all) gives a
/// working configuration for a standard ISIS 3 install on `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Run-level behaviour
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// External program names
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Fixed correlator parameters for jitter measurement
    #[serde(default)]
    pub jitter: JitterConfig,

    /// CCD merge parameters
    #[serde(default)]
    pub mosaic: MosaicConfig,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum number of external tools running at once
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Remove each stage's inputs once its outputs are confirmed on disk
    #[serde(default)]
    pub delete_intermediate: bool,

    /// Stop after noproj, before jitter measurement
    #[serde(default)]
    pub stop_after_noproj: bool,

    /// Require $ISISROOT and a readable ISIS version before starting
    #[serde(default = "default_true")]
    pub check_environment: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            delete_intermediate: false,
            stop_after_noproj: false,
            check_environment: true,
        }
    }
}

/// Names (or paths) of the external programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Directory prepended to every program name. Unset means resolve via `PATH`.
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    #[serde(default = "default_lronac2isis")]
    pub lronac2isis: String,

    #[serde(default = "default_spiceinit")]
    pub spiceinit: String,

    #[serde(default = "default_spicefit")]
    pub spicefit: String,

    #[serde(default = "default_lronaccal")]
    pub lronaccal: String,

    #[serde(default = "default_lronacecho")]
    pub lronacecho: String,

    #[serde(default = "default_noproj")]
    pub noproj: String,

    #[serde(default = "default_lronacjitreg")]
    pub lronacjitreg: String,

    #[serde(default = "default_handmos")]
    pub handmos: String,

    #[serde(default = "default_cubenorm")]
    pub cubenorm: String,

    /// Let spiceinit download kernels from the web
    #[serde(default)]
    pub spiceinit_web: bool,
}

impl ToolsConfig {
    /// Resolve a configured program name against `bin_dir`.
    pub fn program(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn names(&self) -> [(&'static str, &str); 9] {
        [
            ("lronac2isis", self.lronac2isis.as_str()),
            ("spiceinit", self.spiceinit.as_str()),
            ("spicefit", self.spicefit.as_str()),
            ("lronaccal", self.lronaccal.as_str()),
            ("lronacecho", self.lronacecho.as_str()),
            ("noproj", self.noproj.as_str()),
            ("lronacjitreg", self.lronacjitreg.as_str()),
            ("handmos", self.handmos.as_str()),
            ("cubenorm", self.cubenorm.as_str()),
        ]
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            bin_dir: None,
            lronac2isis: default_lronac2isis(),
            spiceinit: default_spiceinit(),
            spicefit: default_spicefit(),
            lronaccal: default_lronaccal(),
            lronacecho: default_lronacecho(),
            noproj: default_noproj(),
            lronacjitreg: default_lronacjitreg(),
            handmos: default_handmos(),
            cubenorm: default_cubenorm(),
            spiceinit_web: false,
        }
    }
}

/// Correlator settings passed to `lronacjitreg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JitterConfig {
    #[serde(default = "default_correlator_type")]
    pub correlator_type: u32,

    #[serde(default = "default_kernel")]
    pub x_kernel: u32,

    #[serde(default = "default_kernel")]
    pub y_kernel: u32,

    #[serde(default = "default_true")]
    pub pyramid: bool,

    /// Horizontal search window [min, max]
    #[serde(default = "default_h_corr")]
    pub h_corr: [i32; 2],

    /// Vertical search window [min, max]
    #[serde(default = "default_v_corr")]
    pub v_corr: [i32; 2],

    #[serde(default = "default_crop_width")]
    pub crop_width: u32,

    /// Where row logs are written. Unset means next to the left cube.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl JitterConfig {
    /// Row log path for one acquisition.
    pub fn log_path(&self, left_cube: &Path, id: impl std::fmt::Display) -> PathBuf {
        let dir = match &self.log_dir {
            Some(dir) => dir.as_path(),
            None => left_cube.parent().unwrap_or_else(|| Path::new(".")),
        };
        dir.join(format!("rowLog_{id}.txt"))
    }
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            correlator_type: 2,
            x_kernel: 15,
            y_kernel: 15,
            pyramid: true,
            h_corr: [0, 60],
            v_corr: [-50, -10],
            crop_width: 200,
            log_dir: None,
        }
    }
}

/// Settings for merging the right CCD into the left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MosaicConfig {
    /// Sample column both CCDs are aligned on before the measured shift
    #[serde(default = "default_reference_sample")]
    pub reference_sample: i64,

    /// handmos priority for the inserted cube
    #[serde(default = "default_priority")]
    pub priority: String,

    /// Enforce matching band bins between source and mosaic
    #[serde(default)]
    pub match_band_bin: bool,
}

impl Default for MosaicConfig {
    fn default() -> Self {
        Self {
            reference_sample: 4900,
            priority: default_priority(),
            match_band_bin: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processing.threads == 0 {
            anyhow::bail!("threads must be > 0");
        }

        for (key, name) in self.tools.names() {
            if name.trim().is_empty() {
                anyhow::bail!("tools.{} must not be empty", key);
            }
        }

        let jitter = &self.jitter;
        if jitter.x_kernel == 0 || jitter.y_kernel == 0 {
            anyhow::bail!("Correlator kernel sizes must be > 0");
        }
        if jitter.h_corr[0] > jitter.h_corr[1] {
            anyhow::bail!(
                "jitter.h_corr min {} exceeds max {}",
                jitter.h_corr[0],
                jitter.h_corr[1]
            );
        }
        if jitter.v_corr[0] > jitter.v_corr[1] {
            anyhow::bail!(
                "jitter.v_corr min {} exceeds max {}",
                jitter.v_corr[0],
                jitter.v_corr[1]
            );
        }
        if jitter.crop_width == 0 {
            anyhow::bail!("jitter.crop_width must be > 0");
        }

        if self.mosaic.priority.trim().is_empty() {
            anyhow::bail!("mosaic.priority must not be empty");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_threads() -> usize { 1 }
fn default_true() -> bool { true }
fn default_lronac2isis() -> String { "lronac2isis".to_string() }
fn default_spiceinit() -> String { "spiceinit".to_string() }
fn default_spicefit() -> String { "spicefit".to_string() }
fn default_lronaccal() -> String { "lronaccal".to_string() }
fn default_lronacecho() -> String { "lronacecho".to_string() }
fn default_noproj() -> String { "noproj".to_string() }
fn default_lronacjitreg() -> String { "lronacjitreg".to_string() }
fn default_handmos() -> String { "handmos".to_string() }
fn default_cubenorm() -> String { "cubenorm".to_string() }
fn default_correlator_type() -> u32 { 2 }
fn default_kernel() -> u32 { 15 }
fn default_h_corr() -> [i32; 2] { [0, 60] }
fn default_v_corr() -> [i32; 2] { [-50, -10] }
fn default_crop_width() -> u32 { 200 }
fn default_reference_sample() -> i64 { 4900 }
fn default_priority() -> String { "ontop".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.threads, 1);
        assert!(!config.processing.delete_intermediate);
        assert_eq!(config.mosaic.reference_sample, 4900);
        assert_eq!(config.jitter.v_corr, [-50, -10]);
    }

    #[test]
    fn test_empty_yaml_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.tools.handmos, "handmos");
        assert_eq!(config.jitter.crop_width, 200);
        assert!(config.processing.check_environment);
    }

    #[test]
    fn test_partial_yaml_overrides() {
        let yaml = r#"
processing:
  threads: 4
  delete_intermediate: true
tools:
  bin_dir: /opt/isis/bin
jitter:
  log_dir: /tmp/logs
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.processing.threads, 4);
        assert!(config.processing.delete_intermediate);
        assert_eq!(config.tools.program("noproj"), PathBuf::from("/opt/isis/bin/noproj"));
        assert_eq!(
            config.jitter.log_path(Path::new("/d/M1LE.cub"), 7),
            PathBuf::from("/tmp/logs/rowLog_7.txt")
        );
    }

    #[test]
    fn test_json_config() {
        let config = Config::from_json(r#"{"mosaic": {"reference_sample": 5000}}"#).unwrap();
        assert_eq!(config.mosaic.reference_sample, 5000);
        assert_eq!(config.mosaic.priority, "ontop");
    }

    #[test]
    fn test_log_path_defaults_to_left_cube_dir() {
        let jitter = JitterConfig::default();
        assert_eq!(
            jitter.log_path(Path::new("/data/M000000100LE.noproj.cub"), "000000100"),
            PathBuf::from("/data/rowLog_000000100.txt")
        );
    }

    #[test]
    fn test_yaml_round_trip_keeps_overrides() {
        let mut config = Config::default();
        config.processing.threads = 8;
        let yaml = config.to_yaml().unwrap();
        assert_eq!(Config::from_yaml(&yaml).unwrap().processing.threads, 8);
    }

    #[test]
    fn test_validation_rejects_zero_threads() {
        let mut config = Config::default();
        config.processing.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_window() {
        let mut config = Config::default();
        config.jitter.v_corr = [10, -10];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_empty_tool() {
        let mut config = Config::default();
        config.tools.cubenorm = " ".to_string();
        assert!(config.validate().is_err());
    }
}
