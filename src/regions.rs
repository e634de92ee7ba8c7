//! Silhouette extraction and hand-region selection.

use crate::constants::{CONTOUR_APPROX_LEVEL, HAND_HEIGHT_SCALE, HAND_PERIM_SCALE};
use crate::utils::image_conversion::array2_u8_to_mat;
use crate::utils::safe_cast::usize_to_i32;
use crate::{Error, Result};
use log::debug;
use ndarray::Array2;
use opencv::core::{Point, Rect, Vec4i, Vector};
use opencv::imgproc;

/// Concavity of a polygon relative to its convex hull
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvexityDefect {
    /// Hull point where the defect starts
    pub start: Point,
    /// Hull point where the defect ends
    pub end: Point,
    /// Polygon point farthest from the hull
    pub deepest: Point,
    /// Distance of `deepest` from the hull in pixels
    pub depth: f32,
}

/// One traced foreground blob
#[derive(Debug, Clone, PartialEq)]
pub struct Silhouette {
    /// Approximated boundary polygon
    pub polygon: Vec<Point>,
    /// Axis-aligned bounding box of the polygon
    pub bounding_box: Rect,
    /// Convex hull as indices into `polygon`
    pub hull: Vec<usize>,
    /// Convexity defects of the polygon
    pub defects: Vec<ConvexityDefect>,
    /// Hand sub-region at the distal extremity
    pub hand_region: Option<Rect>,
    /// Arm-joint sub-region at the opposite extremity
    pub arm_joint_region: Option<Rect>,
}

/// Contour filtering and approximation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionParams {
    /// Frame perimeter over minimum silhouette perimeter
    pub perim_scale: f32,
    /// Frame height over hand height
    pub height_scale: usize,
    /// Douglas-Peucker approximation level in pixels
    pub approx_level: f64,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            perim_scale: HAND_PERIM_SCALE,
            height_scale: HAND_HEIGHT_SCALE,
            approx_level: CONTOUR_APPROX_LEVEL,
        }
    }
}

/// Finds forelimb silhouettes in a cleaned foreground image
#[derive(Debug, Clone)]
pub struct RegionExtractor {
    width: usize,
    height: usize,
    params: RegionParams,
}

impl RegionExtractor {
    /// Create an extractor for `width` x `height` frames
    ///
    /// # Errors
    ///
    /// Returns an error for non-positive scales
    pub fn new(width: usize, height: usize, params: RegionParams) -> Result<Self> {
        if params.perim_scale <= 0.0 || params.height_scale == 0 {
            return Err(Error::InvalidInput(format!(
                "Region scales must be positive, got perimeter {} and height {}",
                params.perim_scale, params.height_scale
            )));
        }
        Ok(Self { width, height, params })
    }

    /// Minimum contour perimeter; shorter contours are noise
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn min_perimeter(&self) -> f64 {
        f64::from((self.width + self.height) as f32 / self.params.perim_scale)
    }

    /// Minimum bounding-box height for a hand region
    #[must_use]
    pub fn hand_height(&self) -> usize {
        self.height / self.params.height_scale
    }

    /// Extract silhouettes in contour-tracing order
    ///
    /// # Errors
    ///
    /// Returns an error if the image size differs or contour tracing fails
    pub fn extract(&self, cleaned: &Array2<u8>) -> Result<Vec<Silhouette>> {
        if cleaned.dim() != (self.height, self.width) {
            return Err(Error::FrameSize {
                expected_width: self.width,
                expected_height: self.height,
                width: cleaned.ncols(),
                height: cleaned.nrows(),
            });
        }
        let image = array2_u8_to_mat(cleaned)?;
        let mut contours: Vector<Vector<Point>> = Vector::new();
        imgproc::find_contours(
            &image,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let min_perimeter = self.min_perimeter();
        let mut silhouettes = Vec::new();
        for contour in &contours {
            let perimeter = imgproc::arc_length(&contour, true)?;
            if perimeter <= min_perimeter {
                continue;
            }
            silhouettes.push(self.build_silhouette(&contour)?);
        }
        debug!("Extracted {} silhouettes from {} contours", silhouettes.len(), contours.len());
        Ok(silhouettes)
    }

    fn build_silhouette(&self, contour: &Vector<Point>) -> Result<Silhouette> {
        let mut approx: Vector<Point> = Vector::new();
        imgproc::approx_poly_dp(contour, &mut approx, self.params.approx_level, true)?;
        let bounding_box = imgproc::bounding_rect(&approx)?;

        let mut hull_indices: Vector<i32> = Vector::new();
        imgproc::convex_hull(&approx, &mut hull_indices, false, false)?;

        let defects = if approx.len() >= 4 {
            convexity_defects(&approx, &hull_indices)
        } else {
            Vec::new()
        };

        let regions = hand_and_arm_regions(bounding_box, usize_to_i32(self.height)?, usize_to_i32(self.hand_height())?);
        Ok(Silhouette {
            polygon: approx.to_vec(),
            bounding_box,
            hull: hull_indices.iter().filter_map(|i| usize::try_from(i).ok()).collect(),
            defects,
            hand_region: regions.map(|(hand, _)| hand),
            arm_joint_region: regions.map(|(_, arm)| arm),
        })
    }
}

/// Defects of a polygon; a degenerate polygon yields none
#[allow(clippy::cast_precision_loss)]
fn convexity_defects(polygon: &Vector<Point>, hull: &Vector<i32>) -> Vec<ConvexityDefect> {
    let mut raw: Vector<Vec4i> = Vector::new();
    if let Err(e) = imgproc::convexity_defects(polygon, hull, &mut raw) {
        debug!("Convexity defects unavailable for {}-vertex polygon: {e}", polygon.len());
        return Vec::new();
    }
    let point_at = |index: i32| usize::try_from(index).ok().and_then(|i| polygon.get(i).ok());
    raw.iter()
        .filter_map(|d| {
            Some(ConvexityDefect {
                start: point_at(d[0])?,
                end: point_at(d[1])?,
                deepest: point_at(d[2])?,
                depth: d[3] as f32 / 256.0,
            })
        })
        .collect()
}

/// Hand strip and arm-joint strip of a bounding box.
///
/// A forearm enters from a frame edge, so the hand lies at the vertical
/// extremity nearer the frame's vertical midpoint (ties select the top) and
/// the arm joint at the edge end. `None` when the box is shorter than
/// `hand_height`.
#[must_use]
pub fn hand_and_arm_regions(bounding_box: Rect, frame_height: i32, hand_height: i32) -> Option<(Rect, Rect)> {
    if hand_height <= 0 || bounding_box.height < hand_height {
        return None;
    }
    let midpoint = frame_height / 2;
    let top = bounding_box.y;
    let bottom = bounding_box.y + bounding_box.height;
    let top_strip = Rect::new(bounding_box.x, top, bounding_box.width, hand_height);
    let bottom_strip = Rect::new(bounding_box.x, bottom - hand_height, bounding_box.width, hand_height);

    if (top - midpoint).abs() > (bottom - midpoint).abs() {
        Some((bottom_strip, top_strip))
    } else {
        Some((top_strip, bottom_strip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hand_region_at_distal_extremity() {
        // Forearm reaching up from the bottom edge
        let (hand, arm) = hand_and_arm_regions(Rect::new(200, 150, 120, 330), 480, 43).unwrap();
        assert_eq!(hand, Rect::new(200, 150, 120, 43));
        assert_eq!(arm, Rect::new(200, 437, 120, 43));

        // Forearm reaching down from the top edge
        let (hand, arm) = hand_and_arm_regions(Rect::new(200, 0, 120, 300), 480, 43).unwrap();
        assert_eq!(hand, Rect::new(200, 257, 120, 43));
        assert_eq!(arm, Rect::new(200, 0, 120, 43));
    }

    #[test]
    fn test_hand_region_tie_selects_top() {
        let (hand, _) = hand_and_arm_regions(Rect::new(0, 100, 10, 40), 240, 20).unwrap();
        assert_eq!(hand.y, 100);
    }

    #[test]
    fn test_short_box_has_no_hand() {
        assert!(hand_and_arm_regions(Rect::new(0, 0, 50, 19), 240, 20).is_none());
        assert!(hand_and_arm_regions(Rect::new(0, 0, 50, 20), 240, 20).is_some());
    }

    #[test]
    fn test_min_perimeter_and_hand_height() {
        let extractor = RegionExtractor::new(640, 480, RegionParams::default()).unwrap();
        assert!((extractor.min_perimeter() - 160.0).abs() < 1e-3);
        assert_eq!(extractor.hand_height(), 43);
        assert!(RegionExtractor::new(640, 480, RegionParams { perim_scale: 0.0, ..RegionParams::default() }).is_err());
    }

    #[test]
    fn test_extract_rectangle_blob() {
        let mut image = Array2::<u8>::zeros((120, 160));
        for y in 30..110 {
            for x in 40..80 {
                image[(y, x)] = 200;
            }
        }
        let extractor = RegionExtractor::new(160, 120, RegionParams::default()).unwrap();
        let silhouettes = extractor.extract(&image).unwrap();
        assert_eq!(silhouettes.len(), 1);
        let silhouette = &silhouettes[0];
        assert_eq!(silhouette.bounding_box, Rect::new(40, 30, 40, 80));
        assert!(silhouette.defects.is_empty());
        assert_eq!(silhouette.hand_region, Some(Rect::new(40, 30, 40, 10)));
        assert_eq!(silhouette.arm_joint_region, Some(Rect::new(40, 100, 40, 10)));
    }

    #[test]
    fn test_small_blob_discarded() {
        let mut image = Array2::<u8>::zeros((120, 160));
        for y in 10..15 {
            for x in 10..15 {
                image[(y, x)] = 255;
            }
        }
        let extractor = RegionExtractor::new(160, 120, RegionParams::default()).unwrap();
        assert!(extractor.extract(&image).unwrap().is_empty());
    }
}
