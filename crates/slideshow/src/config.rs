use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Slideshow behaviour that is not exposed on the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Tuning {
    /// Granularity of the render loop; input and the ingest queue are polled once per step.
    #[serde(with = "humantime_serde")]
    pub idle_step: Duration,
    /// How long a freshly ingested picture stays up with its remove button.
    #[serde(with = "humantime_serde")]
    pub removal_window: Duration,
    pub remove_label: String,
    /// Top-left corner of the remove button, in screen pixels.
    pub remove_origin: [i32; 2],
    /// Rebuild the picture list from disk whenever the slideshow wraps around.
    pub rescan_on_wrap: bool,
    pub recursive: bool,
    pub quit_key: char,
    /// Width of the swipe edge bands and minimum swipe distance, as a fraction of the screen width.
    pub swipe_fraction: f64,
    pub empty_message: String,
    /// Upper bound on how long a notification connection may stay silent.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            idle_step: Duration::from_millis(100),
            removal_window: Duration::from_secs(15),
            remove_label: "remove".to_string(),
            remove_origin: [10, 10],
            rescan_on_wrap: true,
            recursive: true,
            quit_key: 'q',
            swipe_fraction: 0.1,
            empty_message: "No pictures available!".to_string(),
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl Tuning {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        Ok(serde_yaml::from_str(&s)?)
    }

    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.idle_step > Duration::ZERO,
            "idle-step must be greater than zero"
        );
        ensure!(
            self.removal_window >= self.idle_step,
            "removal-window must be at least one idle-step"
        );
        ensure!(
            self.swipe_fraction > 0.0 && self.swipe_fraction < 0.5,
            "swipe-fraction must be within (0.0, 0.5)"
        );
        ensure!(
            !self.remove_label.trim().is_empty(),
            "remove-label must not be empty"
        );
        ensure!(
            self.read_timeout > Duration::ZERO,
            "read-timeout must be greater than zero"
        );
        Ok(self)
    }
}

/// Everything the render loop needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct SlideshowSettings {
    pub picture_dir: PathBuf,
    /// Time each picture stays up during normal rotation.
    pub dwell: Duration,
    pub tuning: Tuning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_touch_display() {
        let tuning: Tuning = serde_yaml::from_str("{}").unwrap();
        assert_eq!(tuning.idle_step, Duration::from_millis(100));
        assert_eq!(tuning.removal_window, Duration::from_secs(15));
        assert_eq!(tuning.remove_origin, [10, 10]);
        assert_eq!(tuning.quit_key, 'q');
        assert!(tuning.rescan_on_wrap);
        assert!(tuning.validated().is_ok());
    }

    #[test]
    fn parses_overrides() {
        let yaml = r#"
idle-step: 20ms
removal-window: 2s
remove-label: "delete"
rescan-on-wrap: false
quit-key: x
"#;
        let tuning: Tuning = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(tuning.idle_step, Duration::from_millis(20));
        assert_eq!(tuning.removal_window, Duration::from_secs(2));
        assert_eq!(tuning.remove_label, "delete");
        assert!(!tuning.rescan_on_wrap);
        assert_eq!(tuning.quit_key, 'x');
    }

    #[test]
    fn rejects_window_shorter_than_step() {
        let tuning: Tuning =
            serde_yaml::from_str("idle-step: 1s\nremoval-window: 100ms\n").unwrap();
        assert!(tuning.validated().is_err());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(serde_yaml::from_str::<Tuning>("dwell: 3s\n").is_err());
    }
}
