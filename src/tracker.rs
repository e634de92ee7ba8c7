//! Debounced press/release detection.

use crate::calibration::{CalibrationTransform, IdentityCalibration};
use crate::constants::{DEBOUNCE_COUNT, FINGER_THICKNESS};
use crate::forelimb::Forelimb;
use crate::surface::ContactTest;
use crate::{Error, Result};
use log::debug;
use nalgebra::{Point2, Point3};
use std::fmt;

/// Kind of finger event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerEventKind {
    /// The finger started touching the surface
    Pressed,
    /// The finger left the surface
    Released,
}

impl fmt::Display for FingerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pressed => f.write_str("pressed"),
            Self::Released => f.write_str("released"),
        }
    }
}

/// A press or release of a fingertip
#[derive(Debug, Clone, PartialEq)]
pub struct FingerEvent {
    pub frame_id: u64,
    /// Image x, image y, depth
    pub image_position: Point3<f32>,
    pub display_position: Point2<f32>,
    pub kind: FingerEventKind,
}

impl fmt::Display for FingerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}: {} at image ({:.1}, {:.1}, {:.1}) display ({:.1}, {:.1})",
            self.frame_id,
            self.kind,
            self.image_position.x,
            self.image_position.y,
            self.image_position.z,
            self.display_position.x,
            self.display_position.y
        )
    }
}

/// Press state with consecutive-frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContactState {
    pressed: bool,
    pressed_count: u32,
    released_count: u32,
}

impl ContactState {
    /// Whether the finger is currently pressed
    #[must_use]
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Consecutive in-contact observations
    #[must_use]
    pub fn pressed_count(&self) -> u32 {
        self.pressed_count
    }

    /// Consecutive out-of-contact observations
    #[must_use]
    pub fn released_count(&self) -> u32 {
        self.released_count
    }

    /// Record one observation; returns the transition it completes, if any
    pub fn observe(&mut self, in_contact: bool, debounce: u32) -> Option<FingerEventKind> {
        if in_contact {
            self.pressed_count = self.pressed_count.saturating_add(1);
            self.released_count = 0;
        } else {
            self.released_count = self.released_count.saturating_add(1);
            self.pressed_count = 0;
        }

        if self.pressed_count == debounce && !self.pressed {
            self.pressed = true;
            Some(FingerEventKind::Pressed)
        } else if self.released_count == debounce && self.pressed {
            self.pressed = false;
            Some(FingerEventKind::Released)
        } else {
            None
        }
    }
}

/// Turns fingertip observations into press and release events
pub struct HandTracker {
    calibration: Box<dyn CalibrationTransform>,
    state: ContactState,
    debounce: u32,
    finger_thickness: f32,
}

impl HandTracker {
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `debounce` is zero or the finger
    /// thickness is not finite
    pub fn new(calibration: Box<dyn CalibrationTransform>, debounce: u32, finger_thickness: f32) -> Result<Self> {
        if debounce == 0 {
            return Err(Error::InvalidInput("Debounce count must be positive".to_string()));
        }
        if !finger_thickness.is_finite() {
            return Err(Error::InvalidInput(format!("Finger thickness must be finite, got {finger_thickness}")));
        }
        Ok(Self {
            calibration,
            state: ContactState::default(),
            debounce,
            finger_thickness,
        })
    }

    /// Current contact state
    #[must_use]
    pub fn state(&self) -> ContactState {
        self.state
    }

    /// Forget the contact history
    pub fn reset(&mut self) {
        self.state = ContactState::default();
    }

    /// Classify every fingertip of every forelimb and emit the events whose
    /// debounce threshold is reached on this frame
    pub fn update(&mut self, forelimbs: &[Forelimb], frame_id: u64, surface: &dyn ContactTest) -> Vec<FingerEvent> {
        let mut events = Vec::new();
        for forelimb in forelimbs {
            for tip in forelimb.fingertips() {
                let in_contact = surface.is_in_contact(tip.x, tip.y, tip.z + self.finger_thickness);
                if let Some(kind) = self.state.observe(in_contact, self.debounce) {
                    let event = FingerEvent {
                        frame_id,
                        image_position: tip,
                        display_position: self.calibration.image_to_display(tip.x, tip.y),
                        kind,
                    };
                    debug!("{event}");
                    events.push(event);
                }
            }
        }
        events
    }
}

impl Default for HandTracker {
    fn default() -> Self {
        Self {
            calibration: Box::new(IdentityCalibration),
            state: ContactState::default(),
            debounce: DEBOUNCE_COUNT,
            finger_thickness: FINGER_THICKNESS,
        }
    }
}
