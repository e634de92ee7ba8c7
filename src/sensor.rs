//! Depth sensor interfaces: frame delivery and coordinate conversion.
//!
//! The tracker only depends on the [`DepthSource`] and [`CoordinateConverter`]
//! traits. [`RecordedDepthStream`] replays raw recordings from disk,
//! [`FrameSequence`] replays frames held in memory, and [`PinholeCamera`]
//! converts between image (projective) and physical (world) coordinates.

use crate::constants::MAX_RECORDING_DIMENSION;
use crate::{Error, Result};
use log::{debug, info};
use nalgebra::Point3;
use ndarray::Array2;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

/// One depth image in millimeters with its frame identifier
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    /// Monotonically increasing frame identifier
    pub frame_id: u64,
    /// Depth samples with shape (height, width)
    pub depth: Array2<u16>,
}

impl DepthFrame {
    /// Create a frame from a row-major buffer of `width * height` samples
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer length does not match the dimensions
    pub fn from_raw(frame_id: u64, width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        let depth = Array2::from_shape_vec((height, width), data)
            .map_err(|e| Error::InvalidInput(format!("Depth buffer does not match {width}x{height}: {e}")))?;
        Ok(Self { frame_id, depth })
    }

    /// A frame with every pixel set to `value`
    #[must_use]
    pub fn filled(frame_id: u64, width: usize, height: usize, value: u16) -> Self {
        Self {
            frame_id,
            depth: Array2::from_elem((height, width), value),
        }
    }

    /// Frame width in pixels
    #[must_use]
    pub fn width(&self) -> usize {
        self.depth.ncols()
    }

    /// Frame height in pixels
    #[must_use]
    pub fn height(&self) -> usize {
        self.depth.nrows()
    }

    /// Depth at column `x`, row `y`, if inside the frame
    #[must_use]
    pub fn depth_at(&self, x: usize, y: usize) -> Option<u16> {
        self.depth.get((y, x)).copied()
    }

    /// Check that the frame is `width` x `height`
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameSize`] on mismatch
    pub fn ensure_size(&self, width: usize, height: usize) -> Result<()> {
        if self.width() == width && self.height() == height {
            Ok(())
        } else {
            Err(Error::FrameSize {
                expected_width: width,
                expected_height: height,
                width: self.width(),
                height: self.height(),
            })
        }
    }
}

/// Source of depth frames; blocks until the next frame is available
pub trait DepthSource {
    /// Wait for and return the next depth frame
    ///
    /// # Errors
    ///
    /// Any error is fatal to the tracking session (device lost, end of stream)
    fn wait_next_depth_frame(&mut self) -> Result<DepthFrame>;

    /// Width of delivered frames
    fn width(&self) -> usize;

    /// Height of delivered frames
    fn height(&self) -> usize;
}

/// Conversion between image space (x, y, depth) and world space (mm)
pub trait CoordinateConverter {
    /// Convert projective points (pixel x, pixel y, depth mm) to world points
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device conversion fails
    fn projective_to_world(&self, points: &[Point3<f32>]) -> Result<Vec<Point3<f32>>>;

    /// Convert world points back to projective points
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying device conversion fails
    fn world_to_projective(&self, points: &[Point3<f32>]) -> Result<Vec<Point3<f32>>>;
}

/// Ideal pinhole model of the depth camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinholeCamera {
    /// Focal length along x in pixels
    pub fx: f32,
    /// Focal length along y in pixels
    pub fy: f32,
    /// Principal point x
    pub cx: f32,
    /// Principal point y
    pub cy: f32,
}

impl PinholeCamera {
    /// Create a pinhole camera model
    #[must_use]
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self { fx, fy, cx, cy }
    }

    /// Camera with the principal point at the image center
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn centered(focal_length: f32, width: usize, height: usize) -> Self {
        Self::new(focal_length, focal_length, width as f32 / 2.0, height as f32 / 2.0)
    }
}

impl CoordinateConverter for PinholeCamera {
    fn projective_to_world(&self, points: &[Point3<f32>]) -> Result<Vec<Point3<f32>>> {
        Ok(points
            .iter()
            .map(|p| Point3::new((p.x - self.cx) * p.z / self.fx, (p.y - self.cy) * p.z / self.fy, p.z))
            .collect())
    }

    fn world_to_projective(&self, points: &[Point3<f32>]) -> Result<Vec<Point3<f32>>> {
        points
            .iter()
            .map(|p| {
                if p.z.abs() <= f32::EPSILON {
                    return Err(Error::InvalidInput(format!(
                        "Cannot project world point with zero depth: {p}"
                    )));
                }
                Ok(Point3::new(p.x * self.fx / p.z + self.cx, p.y * self.fy / p.z + self.cy, p.z))
            })
            .collect()
    }
}

/// Replays a raw depth recording.
///
/// Layout: little-endian `u32` width, `u32` height, then frames of
/// `width * height` little-endian `u16` samples.
pub struct RecordedDepthStream<R: Read = BufReader<File>> {
    reader: R,
    width: usize,
    height: usize,
    frame_bytes: usize,
    next_frame_id: u64,
}

impl RecordedDepthStream<BufReader<File>> {
    /// Open a recording from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or has no valid header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening depth recording {}", path.as_ref().display());
        let file = File::open(path.as_ref())
            .map_err(|e| Error::Sensor(format!("Cannot open recording {}: {e}", path.as_ref().display())))?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read> RecordedDepthStream<R> {
    /// Read the header from any byte source
    ///
    /// # Errors
    ///
    /// Returns an error if the header is truncated or declares an empty or
    /// oversized frame
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let mut header = [0u8; 8];
        reader
            .read_exact(&mut header)
            .map_err(|e| Error::Sensor(format!("Recording header unreadable: {e}")))?;
        let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if width == 0 || height == 0 {
            return Err(Error::Sensor(format!("Recording declares an empty frame size {width}x{height}")));
        }
        if width > MAX_RECORDING_DIMENSION || height > MAX_RECORDING_DIMENSION {
            return Err(Error::Sensor(format!("Recording declares an oversized frame {width}x{height}")));
        }
        let frame_bytes = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(2))
            .ok_or_else(|| Error::Sensor(format!("Recording frame size {width}x{height} overflows")))?;
        debug!("Recording frame size {width}x{height}");
        Ok(Self {
            reader,
            width,
            height,
            frame_bytes,
            next_frame_id: 0,
        })
    }
}

impl<R: Read> DepthSource for RecordedDepthStream<R> {
    fn wait_next_depth_frame(&mut self) -> Result<DepthFrame> {
        let mut bytes = vec![0u8; self.frame_bytes];
        match self.reader.read_exact(&mut bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                return Err(Error::EndOfStream(self.next_frame_id.saturating_sub(1)));
            }
            Err(e) => return Err(Error::Sensor(format!("Failed to read depth frame: {e}"))),
        }
        let samples = bytes.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect();
        let frame = DepthFrame::from_raw(self.next_frame_id, self.width, self.height, samples)?;
        self.next_frame_id += 1;
        Ok(frame)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }
}

/// Write frames in the layout read by [`RecordedDepthStream`]
///
/// # Errors
///
/// Returns an error if a frame has a different size than the first one or
/// writing fails
pub fn write_recording<W: std::io::Write>(mut writer: W, frames: &[DepthFrame]) -> Result<()> {
    let Some(first) = frames.first() else {
        return Err(Error::InvalidInput("Cannot write an empty recording".to_string()));
    };
    let (width, height) = (first.width(), first.height());
    let header_width = u32::try_from(width).map_err(|_| Error::InvalidInput(format!("Width {width} too large")))?;
    let header_height = u32::try_from(height).map_err(|_| Error::InvalidInput(format!("Height {height} too large")))?;
    writer.write_all(&header_width.to_le_bytes())?;
    writer.write_all(&header_height.to_le_bytes())?;
    for frame in frames {
        frame.ensure_size(width, height)?;
        for sample in &frame.depth {
            writer.write_all(&sample.to_le_bytes())?;
        }
    }
    Ok(())
}

/// In-memory frame source
pub struct FrameSequence {
    frames: VecDeque<DepthFrame>,
    width: usize,
    height: usize,
    last_frame_id: u64,
}

impl FrameSequence {
    /// Create a source that yields `frames` in order
    ///
    /// # Errors
    ///
    /// Returns an error if frames differ in size
    pub fn new(frames: Vec<DepthFrame>) -> Result<Self> {
        let (width, height) = frames.first().map_or((0, 0), |f| (f.width(), f.height()));
        for frame in &frames {
            frame.ensure_size(width, height)?;
        }
        Ok(Self {
            frames: frames.into(),
            width,
            height,
            last_frame_id: 0,
        })
    }
}

impl DepthSource for FrameSequence {
    fn wait_next_depth_frame(&mut self) -> Result<DepthFrame> {
        let frame = self.frames.pop_front().ok_or(Error::EndOfStream(self.last_frame_id))?;
        self.last_frame_id = frame.frame_id;
        Ok(frame)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }
}
