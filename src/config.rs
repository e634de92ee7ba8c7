//! Configuration management for the tabletop tracker

use crate::background::ThresholdParams;
use crate::constants::{
    BG_DIFF_HIGH_SCALE, BG_DIFF_LOW_SCALE, BG_IGNORE_FRAMES, BG_INIT_FRAMES, CENTER_COLUMN_RATIO, CONTACT_DIFF_SCALE,
    CONTOUR_APPROX_LEVEL, DEBOUNCE_COUNT, DEFAULT_DEPTH_HEIGHT, DEFAULT_DEPTH_WIDTH, DEFAULT_FOCAL_LENGTH,
    FINGERTIP_ANGLE, FINGERTIP_WIDTH, FINGER_THICKNESS, GRADIENT_THRESHOLD, HAND_HEIGHT_SCALE, HAND_PERIM_SCALE,
    HULL_FINGERTIP_ANGLE, KALMAN_GATING_DISTANCE, MAX_DEPTH, MIN_AVG_DIFF_MM, MORPH_ITERATIONS, MORPH_KERNEL_SIZE,
    SMOOTH_FACTOR, SURFACE_OFFSET, TREND_SMOOTH_FACTOR,
};
use crate::filters::{create_filter, DoubleExponentialFilter, FingertipFilter, KalmanFilter};
use crate::fingertips::{create_detector, DetectorKind, DetectorParams, FingertipDetector};
use crate::regions::RegionParams;
use crate::segmentation::SegmentationParams;
use crate::sensor::PinholeCamera;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tracker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Depth sensor geometry
    pub sensor: SensorConfig,

    /// Background learning
    pub background: BackgroundConfig,

    /// Foreground cleanup
    pub segmentation: SegmentationConfig,

    /// Silhouette extraction
    pub regions: RegionsConfig,

    /// Fingertip detection
    pub fingertips: FingertipConfig,

    /// Temporal filtering
    pub filter: FilterConfig,

    /// Press/release tracking
    pub tracker: TrackerConfig,
}

/// Depth sensor geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Frame width in pixels
    pub width: usize,

    /// Frame height in pixels
    pub height: usize,

    /// Maximum depth in millimeters used for normalization
    pub max_depth: u16,

    /// Focal length along x in pixels
    pub fx: f32,

    /// Focal length along y in pixels
    pub fy: f32,

    /// Principal point x
    pub cx: f32,

    /// Principal point y
    pub cy: f32,
}

/// Background learning window and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Frames skipped while the sensor warms up
    pub ignore_frames: u64,

    /// Frame count completing the background window
    pub init_frames: u64,

    /// Threshold scale in the center column
    pub low_scale: f32,

    /// Threshold scale far from the optical center
    pub high_scale: f32,

    /// Floor of the average difference in millimeters
    pub min_avg_diff_mm: f32,

    /// Half width of the center column relative to the frame width
    pub center_column_ratio: f32,

    /// Camera-to-surface offset in pixels
    pub surface_offset: f32,
}

/// Morphological opening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Odd kernel side length
    pub morph_kernel_size: i32,

    /// Opening iterations
    pub morph_iterations: i32,
}

/// Silhouette filtering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionsConfig {
    /// Frame perimeter over minimum silhouette perimeter
    pub perim_scale: f32,

    /// Frame height over minimum hand height
    pub height_scale: usize,

    /// Polygon approximation level in pixels
    pub approx_level: f64,
}

/// Fingertip detector selection and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingertipConfig {
    /// Detection strategy
    pub detector: DetectorKind,

    /// Maximum angle between defect vectors (radians)
    pub angle_threshold: f32,

    /// Maximum hull vertex angle (radians)
    pub hull_angle_threshold: f32,

    /// Fingertip width in pixels
    pub fingertip_width: f32,

    /// Derivative magnitude ending a finger
    pub gradient_threshold: f32,
}

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Filter type: `none`, `double_exponential` or `kalman`
    pub kind: String,

    /// Level smoothing factor
    pub alpha: f32,

    /// Trend smoothing factor
    pub beta: f32,

    /// Kalman gating distance in pixels
    pub gating_distance: f32,
}

/// Press/release tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Consecutive frames before a press or release is reported
    pub debounce: u32,

    /// Finger thickness in millimeters
    pub finger_thickness: f32,

    /// Multiplier of the average difference defining the contact band
    pub diff_scale: f32,
}

impl Default for SensorConfig {
    #[allow(clippy::cast_precision_loss)]
    fn default() -> Self {
        Self {
            width: DEFAULT_DEPTH_WIDTH,
            height: DEFAULT_DEPTH_HEIGHT,
            max_depth: MAX_DEPTH,
            fx: DEFAULT_FOCAL_LENGTH,
            fy: DEFAULT_FOCAL_LENGTH,
            cx: DEFAULT_DEPTH_WIDTH as f32 / 2.0,
            cy: DEFAULT_DEPTH_HEIGHT as f32 / 2.0,
        }
    }
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            ignore_frames: BG_IGNORE_FRAMES,
            init_frames: BG_INIT_FRAMES,
            low_scale: BG_DIFF_LOW_SCALE,
            high_scale: BG_DIFF_HIGH_SCALE,
            min_avg_diff_mm: MIN_AVG_DIFF_MM,
            center_column_ratio: CENTER_COLUMN_RATIO,
            surface_offset: SURFACE_OFFSET,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            morph_kernel_size: MORPH_KERNEL_SIZE,
            morph_iterations: MORPH_ITERATIONS,
        }
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            perim_scale: HAND_PERIM_SCALE,
            height_scale: HAND_HEIGHT_SCALE,
            approx_level: CONTOUR_APPROX_LEVEL,
        }
    }
}

impl Default for FingertipConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::default(),
            angle_threshold: FINGERTIP_ANGLE,
            hull_angle_threshold: HULL_FINGERTIP_ANGLE,
            fingertip_width: FINGERTIP_WIDTH,
            gradient_threshold: GRADIENT_THRESHOLD,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            kind: "double_exponential".to_string(),
            alpha: SMOOTH_FACTOR,
            beta: TREND_SMOOTH_FACTOR,
            gating_distance: KALMAN_GATING_DISTANCE,
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE_COUNT,
            finger_thickness: FINGER_THICKNESS,
            diff_scale: CONTACT_DIFF_SCALE,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Create the fingertip filter named in the configuration
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown filter type or invalid factors
    pub fn create_filter(&self) -> Result<Box<dyn FingertipFilter>> {
        match self.filter.kind.trim().to_lowercase().as_str() {
            "double_exponential" => {
                check_unit_interval("Alpha", self.filter.alpha)?;
                check_unit_interval("Beta", self.filter.beta)?;
                Ok(Box::new(DoubleExponentialFilter::new(self.filter.alpha, self.filter.beta)?))
            }
            "kalman" => {
                check_positive("Gating distance", self.filter.gating_distance)?;
                Ok(Box::new(KalmanFilter::new(self.filter.gating_distance)?))
            }
            name => create_filter(name),
        }
    }

    /// Create the fingertip detector named in the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a detector threshold is not positive
    pub fn create_detector(&self) -> Result<Box<dyn FingertipDetector>> {
        create_detector(self.fingertips.detector, &self.detector_params())
    }

    /// Detector thresholds
    #[must_use]
    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            angle_threshold: self.fingertips.angle_threshold,
            hull_angle_threshold: self.fingertips.hull_angle_threshold,
            fingertip_width: self.fingertips.fingertip_width,
            gradient_threshold: self.fingertips.gradient_threshold,
        }
    }

    /// Background threshold parameters
    #[must_use]
    pub fn threshold_params(&self) -> ThresholdParams {
        ThresholdParams {
            low_scale: self.background.low_scale,
            high_scale: self.background.high_scale,
            min_avg_diff_mm: self.background.min_avg_diff_mm,
            center_column_ratio: self.background.center_column_ratio,
            surface_offset: self.background.surface_offset,
            center_column: None,
            optical_center: Some((self.sensor.cx, self.sensor.cy)),
        }
    }

    /// Opening parameters
    #[must_use]
    pub fn segmentation_params(&self) -> SegmentationParams {
        SegmentationParams {
            morph_kernel_size: self.segmentation.morph_kernel_size,
            morph_iterations: self.segmentation.morph_iterations,
        }
    }

    /// Silhouette parameters
    #[must_use]
    pub fn region_params(&self) -> RegionParams {
        RegionParams {
            perim_scale: self.regions.perim_scale,
            height_scale: self.regions.height_scale,
            approx_level: self.regions.approx_level,
        }
    }

    /// Pinhole model of the depth camera
    #[must_use]
    pub fn camera(&self) -> PinholeCamera {
        PinholeCamera::new(self.sensor.fx, self.sensor.fy, self.sensor.cx, self.sensor.cy)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid value
    pub fn validate(&self) -> Result<()> {
        // Sensor
        if self.sensor.width == 0 || self.sensor.height == 0 {
            return Err(Error::ConfigError("Sensor width and height must be greater than 0".to_string()));
        }
        if self.sensor.max_depth == 0 {
            return Err(Error::ConfigError("Maximum depth must be greater than 0".to_string()));
        }
        check_positive("Focal length fx", self.sensor.fx)?;
        check_positive("Focal length fy", self.sensor.fy)?;

        // Background
        if self.background.init_frames <= self.background.ignore_frames {
            return Err(Error::ConfigError(format!(
                "Background init frames ({}) must exceed ignored frames ({})",
                self.background.init_frames, self.background.ignore_frames
            )));
        }
        check_positive("Background low scale", self.background.low_scale)?;
        check_positive("Background high scale", self.background.high_scale)?;
        if self.background.min_avg_diff_mm.is_nan() || self.background.min_avg_diff_mm < 0.0 {
            return Err(Error::ConfigError("Minimum average difference must not be negative".to_string()));
        }
        if !(0.0..=0.5).contains(&self.background.center_column_ratio) {
            return Err(Error::ConfigError("Center column ratio must be between 0.0 and 0.5".to_string()));
        }

        // Segmentation
        if self.segmentation.morph_kernel_size <= 0 || self.segmentation.morph_kernel_size % 2 == 0 {
            return Err(Error::ConfigError("Morphology kernel size must be odd and greater than 0".to_string()));
        }
        if self.segmentation.morph_iterations < 0 {
            return Err(Error::ConfigError("Morphology iterations must not be negative".to_string()));
        }

        // Regions
        check_positive("Perimeter scale", self.regions.perim_scale)?;
        if self.regions.height_scale == 0 {
            return Err(Error::ConfigError("Height scale must be greater than 0".to_string()));
        }

        // Fingertips
        check_positive("Fingertip angle threshold", self.fingertips.angle_threshold)?;
        check_positive("Hull angle threshold", self.fingertips.hull_angle_threshold)?;
        check_positive("Fingertip width", self.fingertips.fingertip_width)?;
        check_positive("Gradient threshold", self.fingertips.gradient_threshold)?;

        // Filter
        self.create_filter()?;

        // Tracker
        if self.tracker.debounce == 0 {
            return Err(Error::ConfigError("Debounce count must be greater than 0".to_string()));
        }
        check_positive("Contact scale", self.tracker.diff_scale)?;
        if !self.tracker.finger_thickness.is_finite() {
            return Err(Error::ConfigError("Finger thickness must be finite".to_string()));
        }

        Ok(())
    }
}

fn check_unit_interval(name: &str, value: f32) -> Result<()> {
    if value.is_nan() || value <= 0.0 || value > 1.0 {
        return Err(Error::ConfigError(format!("{name} must be in (0, 1], got {value}")));
    }
    Ok(())
}

fn check_positive(name: &str, value: f32) -> Result<()> {
    if value.is_nan() || value <= 0.0 {
        return Err(Error::ConfigError(format!("{name} must be greater than 0, got {value}")));
    }
    Ok(())
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Tabletop Tracker Configuration

# Depth sensor
sensor:
  width: 640
  height: 480
  max_depth: 1300
  fx: 575.8
  fy: 575.8
  cx: 320.0
  cy: 240.0

# Background learning
background:
  ignore_frames: 20
  init_frames: 60
  low_scale: 6.0
  high_scale: 15.0
  min_avg_diff_mm: 0.8
  center_column_ratio: 0.2
  surface_offset: 100.0

# Foreground cleanup
segmentation:
  morph_kernel_size: 3
  morph_iterations: 1

# Silhouettes
regions:
  perim_scale: 7.0
  height_scale: 11
  approx_level: 2.0

# Fingertip detection: convexity_defects, hull_angle or thinning
fingertips:
  detector: convexity_defects
  angle_threshold: 0.8
  hull_angle_threshold: 1.6
  fingertip_width: 7.0
  gradient_threshold: 0.05

# Temporal filter: none, double_exponential or kalman
filter:
  kind: "double_exponential"
  alpha: 0.9
  beta: 0.9
  gating_distance: 50.0

# Press/release tracking
tracker:
  debounce: 3
  finger_thickness: 10.0
  diff_scale: 5.0
"#;
