//! Configuration for a watch session.
//!
//! The file format is the flat JSON document the camera has always been
//! configured with (`conf.json`); TOML files with the same keys are accepted
//! too. Everything is validated up front so that a bad value stops the program
//! before the camera is opened, never halfway through an incident.

use crate::core_modules::change_detector::DetectorConfig;
use crate::core_modules::incident::{DEFAULT_NO_MOTION_CEILING, IncidentConfig};
use crate::core_modules::region::CropRect;
use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Only look for motion inside `crop_pt1`..`crop_pt2`.
    #[serde(default)]
    pub crop: bool,
    /// Top-left corner of the crop rectangle, `[x, y]`.
    #[serde(default)]
    pub crop_pt1: Option<[u32; 2]>,
    /// Bottom-right corner of the crop rectangle (exclusive), `[x, y]`.
    #[serde(default)]
    pub crop_pt2: Option<[u32; 2]>,
    pub delta_thresh: u8,
    pub min_area: u32,
    pub min_upload_seconds: i64,
    pub min_motion_frames: u32,
    pub min_no_motion_frames: u32,
    #[serde(default)]
    pub send_email: bool,
    pub fps: u32,
    /// Frame size `[width, height]` of the camera and of recorded video.
    pub resolution: [u32; 2],
    #[serde(default)]
    pub show_video: bool,
    /// Seconds to let the camera settle before the first frame is used.
    #[serde(default = "default_warmup")]
    pub camera_warmup_time: f64,

    // Detector tuning.
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u32,
    #[serde(default = "default_no_motion_ceiling")]
    pub no_motion_ceiling: u32,

    // Output.
    #[serde(default = "default_fourcc")]
    pub fourcc: String,
    #[serde(default = "default_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_dir")]
    pub snapshot_dir: PathBuf,
    /// External command run with the snapshot path appended, e.g. a mailer.
    /// Takes the place of SMTP delivery when set.
    #[serde(default)]
    pub notify_command: Option<Vec<String>>,

    // SMTP delivery of the incident snapshot.
    #[serde(default)]
    pub from_addr: Option<String>,
    #[serde(default)]
    pub to_addr: Option<String>,
    /// Password for `from_addr` on the SMTP server.
    #[serde(default)]
    pub email_pwd: Option<String>,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    /// STARTTLS submission port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
}

/// Everything needed to mail a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub from_addr: String,
    pub to_addr: String,
    pub password: String,
    pub host: String,
    pub port: u16,
}

fn default_warmup() -> f64 {
    2.5
}

fn default_alpha() -> f32 {
    0.5
}

fn default_blur_sigma() -> f32 {
    3.5
}

fn default_dilate_iterations() -> u32 {
    2
}

fn default_no_motion_ceiling() -> u32 {
    DEFAULT_NO_MOTION_CEILING
}

fn default_fourcc() -> String {
    "XVID".to_string()
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl WatchConfig {
    /// Loads and validates a configuration file. `.json` files are parsed as
    /// JSON, anything else as TOML.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            VisionError::Configuration(format!("failed to read {}: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json(&contents)?
        } else {
            Self::from_toml(&contents)?
        };

        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(contents).map_err(|e| VisionError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| VisionError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(VisionError::Configuration(msg));

        if self.delta_thresh == 0 {
            return invalid("delta_thresh must be positive".to_string());
        }
        if self.min_area == 0 {
            return invalid("min_area must be positive".to_string());
        }
        if self.fps == 0 {
            return invalid("fps must be positive".to_string());
        }
        let [width, height] = self.resolution;
        if width == 0 || height == 0 {
            return invalid(format!("resolution {width}x{height} must be positive"));
        }
        if !(self.camera_warmup_time.is_finite() && self.camera_warmup_time >= 0.0) {
            return invalid(format!(
                "camera_warmup_time must be a non-negative number of seconds, got {}",
                self.camera_warmup_time
            ));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return invalid(format!("alpha must be in (0, 1], got {}", self.alpha));
        }
        if !(self.blur_sigma.is_finite() && self.blur_sigma >= 0.0) {
            return invalid(format!("blur_sigma must be non-negative, got {}", self.blur_sigma));
        }
        if self.fourcc.chars().count() != 4 {
            return invalid(format!("fourcc must be four characters, got {:?}", self.fourcc));
        }
        if let Some(command) = &self.notify_command {
            if command.is_empty() {
                return invalid("notify_command must name a program".to_string());
            }
        }

        let smtp = self.email_settings()?;
        if self.send_email && smtp.is_none() && self.notify_command.is_none() {
            return invalid(
                "send_email needs from_addr, to_addr and email_pwd, or a notify_command"
                    .to_string(),
            );
        }
        if smtp.is_some() && self.smtp_port == 0 {
            return invalid("smtp_port must be positive".to_string());
        }

        if let Some(rect) = self.crop_rect()? {
            if !rect.fits_within(width, height) {
                return invalid(format!(
                    "crop rectangle {rect:?} lies outside the {width}x{height} frame"
                ));
            }
        }

        self.incident_config().validate()
    }

    /// The crop rectangle, when cropping is enabled.
    pub fn crop_rect(&self) -> Result<Option<CropRect>> {
        if !self.crop {
            return Ok(None);
        }
        match (self.crop_pt1, self.crop_pt2) {
            (Some(pt1), Some(pt2)) => CropRect::from_corners(pt1, pt2).map(Some),
            _ => Err(VisionError::Configuration(
                "crop is enabled but crop_pt1/crop_pt2 are missing".to_string(),
            )),
        }
    }

    /// The SMTP settings, when any are configured. Setting only some of the
    /// three address keys is an error.
    pub fn email_settings(&self) -> Result<Option<EmailSettings>> {
        match (&self.from_addr, &self.to_addr, &self.email_pwd) {
            (None, None, None) => Ok(None),
            (Some(from_addr), Some(to_addr), Some(password)) => Ok(Some(EmailSettings {
                from_addr: from_addr.clone(),
                to_addr: to_addr.clone(),
                password: password.clone(),
                host: self.smtp_host.clone(),
                port: self.smtp_port,
            })),
            _ => Err(VisionError::Configuration(
                "from_addr, to_addr and email_pwd must be set together".to_string(),
            )),
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            delta_threshold: self.delta_thresh,
            min_area: self.min_area,
            dilate_iterations: self.dilate_iterations,
        }
    }

    pub fn incident_config(&self) -> IncidentConfig {
        IncidentConfig {
            min_upload_seconds: self.min_upload_seconds,
            min_motion_frames: self.min_motion_frames,
            min_no_motion_frames: self.min_no_motion_frames,
            send_email: self.send_email,
            no_motion_ceiling: self.no_motion_ceiling,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF_JSON: &str = r#"{
        "show_video": true,
        "min_upload_seconds": 3,
        "min_motion_frames": 8,
        "min_no_motion_frames": 10,
        "camera_warmup_time": 2.5,
        "delta_thresh": 5,
        "resolution": [640, 480],
        "fps": 16,
        "min_area": 5000,
        "crop": true,
        "crop_pt1": [100, 50],
        "crop_pt2": [400, 300],
        "send_email": true,
        "from_addr": "camera@example.com",
        "to_addr": "owner@example.com",
        "email_pwd": "hunter2"
    }"#;

    fn parsed() -> WatchConfig {
        WatchConfig::from_json(CONF_JSON).unwrap()
    }

    #[test]
    fn parses_the_json_format_with_defaults() {
        let config = parsed();
        assert_eq!(config.resolution, [640, 480]);
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.dilate_iterations, 2);
        assert_eq!(config.no_motion_ceiling, 1000);
        assert_eq!(config.fourcc, "XVID");
        assert!(config.notify_command.is_none());
        let smtp = config.email_settings().unwrap().unwrap();
        assert_eq!(smtp.host, "smtp.gmail.com");
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.to_addr, "owner@example.com");
        assert_eq!(
            config.crop_rect().unwrap(),
            Some(CropRect { x: 100, y: 50, width: 300, height: 250 })
        );
        assert_eq!(config.incident_config().min_motion_frames, 8);
        assert_eq!(config.detector_config().min_area, 5000);
    }

    #[test]
    fn parses_toml() {
        let config = WatchConfig::from_toml(
            r#"
            delta_thresh = 5
            min_area = 50
            min_upload_seconds = 10
            min_motion_frames = 3
            min_no_motion_frames = 5
            fps = 10
            resolution = [320, 240]
            notify_command = ["mail-snapshot", "--to", "door@example.com"]
            "#,
        )
        .unwrap();
        assert!(!config.crop);
        assert_eq!(config.crop_rect().unwrap(), None);
        assert_eq!(config.notify_command.unwrap().len(), 3);
    }

    #[test]
    fn missing_required_key_is_a_parse_error() {
        let err = WatchConfig::from_json(r#"{ "delta_thresh": 5 }"#).unwrap_err();
        assert!(matches!(err, VisionError::Parse(_)));
    }

    #[test]
    fn negative_numbers_are_rejected() {
        let json = CONF_JSON.replace("\"min_area\": 5000", "\"min_area\": -5");
        assert!(WatchConfig::from_json(&json).is_err());

        let json = CONF_JSON.replace("\"min_upload_seconds\": 3", "\"min_upload_seconds\": -3");
        assert!(matches!(
            WatchConfig::from_json(&json),
            Err(VisionError::Configuration(_))
        ));
    }

    #[test]
    fn zero_values_are_rejected() {
        let mut config = parsed();
        config.min_motion_frames = 0;
        assert!(matches!(config.validate(), Err(VisionError::Configuration(_))));

        let mut config = parsed();
        config.delta_thresh = 0;
        assert!(config.validate().is_err());

        let mut config = parsed();
        config.resolution = [0, 480];
        assert!(config.validate().is_err());

        let mut config = parsed();
        config.alpha = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn crop_must_lie_inside_the_frame() {
        let mut config = parsed();
        config.crop_pt2 = Some([641, 300]);
        assert!(matches!(config.validate(), Err(VisionError::Configuration(_))));

        config.crop_pt2 = Some([640, 480]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn crop_without_corners_is_rejected() {
        let mut config = parsed();
        config.crop_pt1 = None;
        assert!(config.validate().is_err());

        config.crop = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn send_email_needs_a_way_to_deliver() {
        let mut config = parsed();
        config.email_pwd = None;
        assert!(matches!(config.validate(), Err(VisionError::Configuration(_))));

        config.from_addr = None;
        config.to_addr = None;
        assert!(matches!(config.validate(), Err(VisionError::Configuration(_))));

        config.notify_command = Some(vec!["mail-snapshot".to_string()]);
        assert!(config.validate().is_ok());

        config.notify_command = None;
        config.send_email = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_file_picks_the_parser_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf.json");
        std::fs::write(&path, CONF_JSON).unwrap();

        assert_eq!(WatchConfig::load_from_file(&path).unwrap(), parsed());
        assert!(matches!(
            WatchConfig::load_from_file(dir.path().join("missing.toml")),
            Err(VisionError::Configuration(_))
        ));
    }
}
