//! Frame-synchronous hand analysis pipeline.
//!
//! A session starts with sensor warm-up frames that are ignored, continues
//! with a background learning window, and tracks forelimbs once the
//! background statistics and the interaction surface are available.

use crate::background::{BackgroundModel, BackgroundStatistics, ThresholdParams};
use crate::config::Config;
use crate::estimator::ForelimbModelEstimator;
use crate::filters::FingertipFilter;
use crate::fingertips::FrameContext;
use crate::forelimb::Forelimb;
use crate::regions::RegionExtractor;
use crate::segmentation::ForegroundSegmenter;
use crate::sensor::{CoordinateConverter, DepthFrame};
use crate::surface::InteractionSurface;
use crate::Result;
use log::{debug, info};
use nalgebra::Point3;
use std::fmt;

/// Stage of a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Sensor warm-up; frames are dropped
    Ignoring,
    /// Frames feed the background model
    LearningBackground,
    /// Background and surface are fixed; forelimbs are tracked
    Tracking,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignoring => f.write_str("ignoring"),
            Self::LearningBackground => f.write_str("learning background"),
            Self::Tracking => f.write_str("tracking"),
        }
    }
}

/// Result of analyzing one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Forelimbs of the frame, empty before tracking starts
    pub forelimbs: Vec<Forelimb>,
    /// Smoothed fingertip of the first forelimb
    pub filtered_fingertip: Option<Point3<f32>>,
    /// Foreground pixels in the frame's mask
    pub foreground_pixels: usize,
}

/// Session window and surface parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerParams {
    pub width: usize,
    pub height: usize,
    pub max_depth: u16,
    pub ignore_frames: u64,
    pub init_frames: u64,
    pub thresholds: ThresholdParams,
    pub diff_scale: f32,
}

impl AnalyzerParams {
    /// Parameters from a validated configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            width: config.sensor.width,
            height: config.sensor.height,
            max_depth: config.sensor.max_depth,
            ignore_frames: config.background.ignore_frames,
            init_frames: config.background.init_frames,
            thresholds: config.threshold_params(),
            diff_scale: config.tracker.diff_scale,
        }
    }
}

/// Runs segmentation, region extraction, forelimb estimation and filtering
pub struct HandAnalyzer {
    params: AnalyzerParams,
    converter: Box<dyn CoordinateConverter>,
    segmenter: ForegroundSegmenter,
    extractor: RegionExtractor,
    estimator: ForelimbModelEstimator,
    filter: Box<dyn FingertipFilter>,
    model: BackgroundModel,
    statistics: Option<BackgroundStatistics>,
    surface: Option<InteractionSurface>,
    frames_seen: u64,
}

impl HandAnalyzer {
    /// Build the pipeline described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: &Config, converter: Box<dyn CoordinateConverter>) -> Result<Self> {
        config.validate()?;
        let params = AnalyzerParams::from_config(config);
        info!(
            "Hand analyzer {}x{}: ignoring {} frames, background until frame {}",
            params.width, params.height, params.ignore_frames, params.init_frames
        );
        Ok(Self {
            segmenter: ForegroundSegmenter::new(config.segmentation_params())?,
            extractor: RegionExtractor::new(params.width, params.height, config.region_params())?,
            estimator: ForelimbModelEstimator::new(config.create_detector()?),
            filter: config.create_filter()?,
            model: BackgroundModel::new(params.width, params.height, params.max_depth)?,
            statistics: None,
            surface: None,
            frames_seen: 0,
            converter,
            params,
        })
    }

    /// Current session phase
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        if self.statistics.is_some() {
            SessionPhase::Tracking
        } else if self.frames_seen < self.params.ignore_frames {
            SessionPhase::Ignoring
        } else {
            SessionPhase::LearningBackground
        }
    }

    /// Background statistics, once learned
    #[must_use]
    pub fn statistics(&self) -> Option<&BackgroundStatistics> {
        self.statistics.as_ref()
    }

    /// Interaction surface, once fitted
    #[must_use]
    pub fn surface(&self) -> Option<&InteractionSurface> {
        self.surface.as_ref()
    }

    /// Coordinate converter of the depth sensor
    #[must_use]
    pub fn converter(&self) -> &dyn CoordinateConverter {
        self.converter.as_ref()
    }

    /// Analyze one frame.
    ///
    /// Warm-up and learning frames yield an empty [`Analysis`]. The frame
    /// completing the background window finalizes the statistics and fits
    /// the surface.
    ///
    /// # Errors
    ///
    /// Returns an error for frames of the wrong size, or when an `OpenCV`
    /// operation or coordinate conversion fails
    pub fn process_frame(&mut self, frame: &DepthFrame) -> Result<Analysis> {
        frame.ensure_size(self.params.width, self.params.height)?;

        if self.statistics.is_none() {
            self.frames_seen += 1;
            if self.frames_seen <= self.params.ignore_frames {
                return Ok(Analysis::default());
            }
            self.model.accumulate(frame)?;
            if self.frames_seen >= self.params.init_frames {
                self.finish_background()?;
            }
            return Ok(Analysis::default());
        }

        self.track(frame)
    }

    fn finish_background(&mut self) -> Result<()> {
        let statistics = self.model.take().finalize(&self.params.thresholds)?;
        let surface = InteractionSurface::fit(&statistics, self.converter.as_ref(), self.params.diff_scale)?;
        info!("Background learned from {} frames", statistics.frame_count());
        self.statistics = Some(statistics);
        self.surface = Some(surface);
        Ok(())
    }

    fn track(&mut self, frame: &DepthFrame) -> Result<Analysis> {
        let (Some(statistics), Some(surface)) = (self.statistics.as_ref(), self.surface.as_ref()) else {
            return Ok(Analysis::default());
        };

        let segmentation = self.segmenter.segment(statistics, frame)?;
        let silhouettes = self.extractor.extract(&segmentation.cleaned)?;
        let context = FrameContext {
            frame,
            segmentation: &segmentation,
        };
        let forelimbs = self
            .estimator
            .estimate(&silhouettes, &context, self.converter.as_ref(), surface)?;
        let filtered_fingertip = self.filter.apply(&forelimbs);

        debug!(
            "Frame {}: {} silhouettes, {} forelimbs, filtered fingertip {:?}",
            frame.frame_id,
            silhouettes.len(),
            forelimbs.len(),
            filtered_fingertip
        );
        Ok(Analysis {
            forelimbs,
            filtered_fingertip,
            foreground_pixels: segmentation.foreground_count(),
        })
    }

    /// Start a new session: relearn the background and clear all state
    pub fn reset(&mut self) {
        self.model.clear();
        self.statistics = None;
        self.surface = None;
        self.frames_seen = 0;
        self.estimator.reset();
        self.filter.reset();
        info!("Hand analyzer reset");
    }
}
