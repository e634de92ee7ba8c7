//! Forelimb and fingertip tracking over depth-camera frames for interactive
//! tabletop surfaces.
//!
//! The library turns raw per-pixel depth into fingertip press and release
//! events using:
//! - `OpenCV` for morphology, contour tracing, convex hulls and calibration
//! - `ndarray` for per-pixel image state
//! - `nalgebra` for point geometry, PCA and the Kalman filter
//!
//! The per-frame pipeline consists of:
//! 1. Background learning over an initialization window
//! 2. Foreground segmentation against the learned depth band
//! 3. Silhouette extraction and hand-region selection
//! 4. Fingertip detection from contour geometry
//! 5. Temporal smoothing of the tracked fingertip
//! 6. Debounced surface-contact detection
//!
//! # Examples
//!
//! ## Replaying a recording
//!
//! ```no_run
//! use tabletop_tracker::{
//!     calibration::IdentityCalibration,
//!     config::Config,
//!     engine::HandTrackingEngine,
//!     sensor::RecordedDepthStream,
//!     Error,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let stream = RecordedDepthStream::open("session.depth")?;
//! let mut engine = HandTrackingEngine::new(
//!     stream,
//!     Box::new(config.camera()),
//!     Box::new(IdentityCalibration),
//!     &config,
//! )?;
//!
//! loop {
//!     match engine.step() {
//!         Ok(output) => {
//!             for event in &output.events {
//!                 println!("{event}");
//!             }
//!         }
//!         Err(Error::EndOfStream(_)) => break,
//!         Err(e) => return Err(e.into()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using Filters
//!
//! ```
//! use tabletop_tracker::filters::create_filter;
//! use tabletop_tracker::forelimb::{FingertipCandidate, Forelimb};
//! use nalgebra::Point3;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut filter = create_filter("kalman")?;
//! let forelimb = Forelimb::from_fingertips(vec![FingertipCandidate::new(Point3::new(120.0, 80.0, 950.0), 1.0)]);
//!
//! let smoothed = filter.apply(&[forelimb]);
//! assert_eq!(smoothed, Some(Point3::new(120.0, 80.0, 950.0)));
//!
//! // A frame without fingertips restarts the filter
//! assert_eq!(filter.apply(&[]), None);
//! # Ok(())
//! # }
//! ```

/// Per-pixel background statistics
pub mod background;

/// Foreground segmentation
pub mod segmentation;

/// Silhouettes and hand regions
pub mod regions;

/// Fingertip detection strategies
pub mod fingertips;

/// Temporal filtering of the tracked fingertip
pub mod filters;

/// Interaction surface plane and contact test
pub mod surface;

/// Debounced press/release tracking
pub mod tracker;

/// Forelimb model types
pub mod forelimb;

/// Hand pose from the hand point cloud
pub mod hand_features;

/// Forelimb model estimation
pub mod estimator;

/// Pointing-ray intersection
pub mod pointing;

/// Frame-synchronous analysis pipeline
pub mod analyzer;

/// Sensor-driven tracking engine
pub mod engine;

/// Depth sources and coordinate conversion
pub mod sensor;

/// Image to display calibration
pub mod calibration;

/// Utility functions for geometry, casts and image conversion
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the library
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
