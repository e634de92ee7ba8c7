//! Sensor to events: one blocking step per depth frame.

use crate::analyzer::{HandAnalyzer, SessionPhase};
use crate::calibration::CalibrationTransform;
use crate::config::Config;
use crate::forelimb::Forelimb;
use crate::pointing::PointingGestureHandler;
use crate::sensor::{CoordinateConverter, DepthSource};
use crate::tracker::{FingerEvent, HandTracker};
use crate::{Error, Result};
use log::info;
use nalgebra::Point3;

/// Everything produced for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutput {
    pub frame_id: u64,
    pub forelimbs: Vec<Forelimb>,
    /// Smoothed fingertip in image coordinates (x, y, depth)
    pub filtered_fingertip: Option<Point3<f32>>,
    /// Press and release events completed on this frame
    pub events: Vec<FingerEvent>,
    /// Pointing-ray intersections with the surface in world coordinates
    pub pointed: Vec<Point3<f32>>,
}

/// Drives the analyzer and the tracker from a depth source
pub struct HandTrackingEngine<S: DepthSource> {
    source: S,
    analyzer: HandAnalyzer,
    tracker: HandTracker,
    pointing: PointingGestureHandler,
    phase: Option<SessionPhase>,
}

impl<S: DepthSource> HandTrackingEngine<S> {
    /// Create an engine
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or does not match
    /// the source's frame size
    pub fn new(
        source: S,
        converter: Box<dyn CoordinateConverter>,
        calibration: Box<dyn CalibrationTransform>,
        config: &Config,
    ) -> Result<Self> {
        if source.width() != config.sensor.width || source.height() != config.sensor.height {
            return Err(Error::FrameSize {
                expected_width: config.sensor.width,
                expected_height: config.sensor.height,
                width: source.width(),
                height: source.height(),
            });
        }
        let analyzer = HandAnalyzer::new(config, converter)?;
        let tracker = HandTracker::new(calibration, config.tracker.debounce, config.tracker.finger_thickness)?;
        Ok(Self {
            source,
            analyzer,
            tracker,
            pointing: PointingGestureHandler,
            phase: None,
        })
    }

    /// Current session phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.analyzer.phase()
    }

    /// The analysis pipeline
    #[must_use]
    pub fn analyzer(&self) -> &HandAnalyzer {
        &self.analyzer
    }

    /// Wait for the next frame and process it
    ///
    /// # Errors
    ///
    /// Sensor failures, the end of the stream and pipeline failures are
    /// returned as is; all of them end the session
    pub fn step(&mut self) -> Result<FrameOutput> {
        let frame = self.source.wait_next_depth_frame()?;
        let analysis = self.analyzer.process_frame(&frame)?;
        self.log_phase();

        let mut output = FrameOutput {
            frame_id: frame.frame_id,
            forelimbs: analysis.forelimbs,
            filtered_fingertip: analysis.filtered_fingertip,
            ..FrameOutput::default()
        };
        if let Some(surface) = self.analyzer.surface() {
            output.events = self.tracker.update(&output.forelimbs, frame.frame_id, surface);
            output.pointed = self.pointing.update(&output.forelimbs, surface);
        }
        Ok(output)
    }

    /// Start a new session
    pub fn reset(&mut self) {
        self.analyzer.reset();
        self.tracker.reset();
        self.phase = None;
    }

    fn log_phase(&mut self) {
        let phase = self.analyzer.phase();
        if self.phase != Some(phase) {
            info!("Session phase: {phase}");
            self.phase = Some(phase);
        }
    }
}
