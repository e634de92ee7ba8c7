//! Constants used throughout the tracker

/// Default depth sensor resolution
pub const DEFAULT_DEPTH_WIDTH: usize = 640;
pub const DEFAULT_DEPTH_HEIGHT: usize = 480;

/// Largest frame side accepted from a recording header
pub const MAX_RECORDING_DIMENSION: usize = 8192;

/// Farthest depth of the tabletop setup in millimeters
pub const MAX_DEPTH: u16 = 1300;

/// Default pinhole intrinsics of the depth camera (pixels)
pub const DEFAULT_FOCAL_LENGTH: f32 = 575.8;

/// Frames ignored while the sensor warms up
pub const BG_IGNORE_FRAMES: u64 = 20;

/// Frame count at which the background window completes
pub const BG_INIT_FRAMES: u64 = BG_IGNORE_FRAMES + 40;

/// Threshold scales applied to the average frame difference
pub const BG_DIFF_LOW_SCALE: f32 = 6.0;
pub const BG_DIFF_HIGH_SCALE: f32 = 15.0;

/// Minimum per-pixel average difference in millimeters
pub const MIN_AVG_DIFF_MM: f32 = 0.8;

/// Half width of the low-noise center column as a fraction of frame width
pub const CENTER_COLUMN_RATIO: f32 = 0.2;

/// Camera-to-surface offset in pixels used by the adaptive scale
pub const SURFACE_OFFSET: f32 = 100.0;

/// Morphological opening parameters
pub const MORPH_KERNEL_SIZE: i32 = 3;
pub const MORPH_ITERATIONS: i32 = 1;

/// Douglas-Peucker approximation level in pixels
pub const CONTOUR_APPROX_LEVEL: f64 = 2.0;

/// Ratio between the perimeter of the table and the perimeter of the hand.
/// Assumes a 15x15 cm hand on a 122x92 cm table.
pub const HAND_PERIM_SCALE: f32 = 7.0;

/// Ratio between the height of the table and the minimum hand height (8 cm)
pub const HAND_HEIGHT_SCALE: usize = 11;

/// Around 45 degrees
pub const FINGERTIP_ANGLE: f32 = 0.8;

/// Triangle angle threshold of the hull-angle detector
pub const HULL_FINGERTIP_ANGLE: f32 = 1.6;

/// Fingertip width in pixels
pub const FINGERTIP_WIDTH: f32 = 7.0;

/// Derivative magnitude marking the end of a finger
pub const GRADIENT_THRESHOLD: f32 = 0.05;

/// Thinning and pruning passes of the skeleton detector
pub const THINNING_PASSES: usize = 20;
pub const PRUNING_PASSES: usize = 8;

/// Double exponential smoothing factors
pub const SMOOTH_FACTOR: f32 = 0.9;
pub const TREND_SMOOTH_FACTOR: f32 = 0.9;

/// Maximum distance in pixels between a Kalman prediction and its observation
pub const KALMAN_GATING_DISTANCE: f32 = 50.0;

/// Multiplier of the average difference defining the contact band
pub const CONTACT_DIFF_SCALE: f32 = 5.0;

/// Consecutive frames required before a press or release is honored
pub const DEBOUNCE_COUNT: u32 = 3;

/// Finger thickness in millimeters
pub const FINGER_THICKNESS: f32 = 10.0;

/// Minimum confidence for a fingertip to be reported
pub const FINGERTIP_CONFIDENCE_MIN: f32 = 0.5;
