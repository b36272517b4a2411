//! Eye openness geometry

use serde::{Deserialize, Serialize};

use crate::landmarks::{EyeLandmarks, EyeRole};

/// Eye openness ratio for six canonical eye points.
///
/// `(|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)`. Returns 0 when the corners
/// coincide or the distances overflow, so degenerate geometry reads as a
/// closed eye and never as NaN.
pub fn openness_ratio(eye: &EyeLandmarks) -> f32 {
    let vertical_a = eye
        .point(EyeRole::UpperLid1)
        .distance(&eye.point(EyeRole::LowerLid1));
    let vertical_b = eye
        .point(EyeRole::UpperLid2)
        .distance(&eye.point(EyeRole::LowerLid2));
    let horizontal = eye
        .point(EyeRole::OuterCorner)
        .distance(&eye.point(EyeRole::InnerCorner));

    if horizontal == 0.0 || !horizontal.is_finite() {
        return 0.0;
    }

    let ratio = (vertical_a + vertical_b) / (2.0 * horizontal);
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// Per-eye openness for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeMeasurement {
    pub left: f32,
    pub right: f32,
    /// Mean of both eyes
    pub average: f32,
}

impl EyeMeasurement {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left,
            right,
            average: (left + right) / 2.0,
        }
    }

    /// Measure both eyes, left then right
    pub fn from_eyes([left, right]: &[EyeLandmarks; 2]) -> Self {
        Self::new(openness_ratio(left), openness_ratio(right))
    }
}
