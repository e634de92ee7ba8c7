//! Utility functions for image buffers, casts, and geometry.

pub mod geometry;
pub mod image_conversion;
pub mod safe_cast;

use opencv::core::{Point, Rect};

/// Whether `point` lies inside `rect`, borders included
#[must_use]
pub fn point_in_rect(point: Point, rect: Rect) -> bool {
    point.x >= rect.x && point.x <= rect.x + rect.width && point.y >= rect.y && point.y <= rect.y + rect.height
}

/// Clip a rectangle to the `width` x `height` image area
#[must_use]
pub fn clip_rect(rect: Rect, width: i32, height: i32) -> Rect {
    let x1 = rect.x.clamp(0, width);
    let y1 = rect.y.clamp(0, height);
    let x2 = (rect.x + rect.width).clamp(0, width);
    let y2 = (rect.y + rect.height).clamp(0, height);
    Rect::new(x1, y1, x2 - x1, y2 - y1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_in_rect_inclusive() {
        let rect = Rect::new(10, 10, 20, 5);
        assert!(point_in_rect(Point::new(10, 10), rect));
        assert!(point_in_rect(Point::new(30, 15), rect));
        assert!(!point_in_rect(Point::new(31, 15), rect));
        assert!(!point_in_rect(Point::new(15, 9), rect));
    }

    #[test]
    fn test_clip_rect() {
        let clipped = clip_rect(Rect::new(-5, 90, 20, 20), 100, 100);
        assert_eq!(clipped, Rect::new(0, 90, 15, 10));

        let inside = Rect::new(1, 2, 3, 4);
        assert_eq!(clip_rect(inside, 100, 100), inside);
    }
}
