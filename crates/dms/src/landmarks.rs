//! Facial landmark types and eye point selection

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Number of points describing one eye
pub const EYE_POINTS: usize = 6;

/// 2-D point in image space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f32,
    pub y: f32,
}

impl Point2D {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point2D) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Scale both coordinates about the origin
    pub fn scale(&self, sx: f32, sy: f32) -> Point2D {
        Point2D::new(self.x * sx, self.y * sy)
    }
}

impl From<(f32, f32)> for Point2D {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

impl From<[f32; 2]> for Point2D {
    fn from([x, y]: [f32; 2]) -> Self {
        Self::new(x, y)
    }
}

/// Logical role of each eye point, in canonical p1..p6 order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeRole {
    OuterCorner,
    UpperLid1,
    UpperLid2,
    InnerCorner,
    LowerLid2,
    LowerLid1,
}

impl EyeRole {
    pub const ALL: [EyeRole; EYE_POINTS] = [
        EyeRole::OuterCorner,
        EyeRole::UpperLid1,
        EyeRole::UpperLid2,
        EyeRole::InnerCorner,
        EyeRole::LowerLid2,
        EyeRole::LowerLid1,
    ];

    /// Position in the canonical ordering (p1 = 0)
    pub fn position(self) -> usize {
        match self {
            EyeRole::OuterCorner => 0,
            EyeRole::UpperLid1 => 1,
            EyeRole::UpperLid2 => 2,
            EyeRole::InnerCorner => 3,
            EyeRole::LowerLid2 => 4,
            EyeRole::LowerLid1 => 5,
        }
    }
}

/// Six eye points in canonical order: outer corner, two upper-lid points,
/// inner corner, two lower-lid points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks {
    points: [Point2D; EYE_POINTS],
}

impl EyeLandmarks {
    /// Build from exactly six finite points
    pub fn new(points: &[Point2D]) -> Result<Self, DmsError> {
        let points: [Point2D; EYE_POINTS] =
            points
                .try_into()
                .map_err(|_| DmsError::InvalidLandmarkSet {
                    expected: EYE_POINTS,
                    actual: points.len(),
                })?;
        if let Some(position) = points.iter().position(|p| !p.is_finite()) {
            return Err(DmsError::NonFiniteLandmark { position });
        }
        Ok(Self { points })
    }

    pub fn point(&self, role: EyeRole) -> Point2D {
        self.points[role.position()]
    }

    pub fn points(&self) -> &[Point2D; EYE_POINTS] {
        &self.points
    }
}

impl TryFrom<&[Point2D]> for EyeLandmarks {
    type Error = DmsError;

    fn try_from(points: &[Point2D]) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

/// Coordinate space of provider output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpace {
    /// Fractions of frame width/height in [0, 1]
    #[default]
    Normalized,
    /// Image pixels
    Pixel,
}

/// Raw landmark set for one face, addressed by provider index
#[derive(Debug, Clone, PartialEq)]
pub struct FaceLandmarks {
    pub points: Vec<Point2D>,
    pub space: CoordinateSpace,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point2D>, space: CoordinateSpace) -> Self {
        Self { points, space }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Convert to pixel space for a frame of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> FaceLandmarks {
        match self.space {
            CoordinateSpace::Pixel => self.clone(),
            CoordinateSpace::Normalized => FaceLandmarks {
                points: self
                    .points
                    .iter()
                    .map(|p| p.scale(width as f32, height as f32))
                    .collect(),
                space: CoordinateSpace::Pixel,
            },
        }
    }

    /// Select the six points of one eye by provider index
    pub fn eye(&self, indices: &[usize; EYE_POINTS]) -> Result<EyeLandmarks, DmsError> {
        let selected: Vec<Point2D> = indices
            .iter()
            .filter_map(|&i| self.points.get(i).copied())
            .collect();
        EyeLandmarks::new(&selected)
    }

    /// Select both eyes, left then right
    pub fn eyes(&self, map: &EyeIndexMap) -> Result<[EyeLandmarks; 2], DmsError> {
        Ok([self.eye(&map.left)?, self.eye(&map.right)?])
    }
}

/// Provider index of each eye point, in canonical p1..p6 order.
///
/// Defaults to the MediaPipe FaceMesh topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EyeIndexMap {
    pub left: [usize; EYE_POINTS],
    pub right: [usize; EYE_POINTS],
}

impl Default for EyeIndexMap {
    fn default() -> Self {
        Self::mediapipe()
    }
}

impl EyeIndexMap {
    pub fn mediapipe() -> Self {
        Self {
            left: [362, 385, 387, 263, 373, 380],
            right: [33, 160, 158, 133, 153, 144],
        }
    }

    /// Highest index referenced by either eye
    pub fn max_index(&self) -> usize {
        self.left
            .iter()
            .chain(self.right.iter())
            .copied()
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_points() -> Vec<Point2D> {
        vec![
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, -1.0),
            Point2D::new(2.0, -1.0),
            Point2D::new(3.0, 0.0),
            Point2D::new(2.0, 1.0),
            Point2D::new(1.0, 1.0),
        ]
    }

    #[test]
    fn test_eye_from_six_points() {
        let eye = EyeLandmarks::new(&six_points()).unwrap();
        assert_eq!(eye.point(EyeRole::OuterCorner), Point2D::new(0.0, 0.0));
        assert_eq!(eye.point(EyeRole::InnerCorner), Point2D::new(3.0, 0.0));
        assert_eq!(eye.point(EyeRole::LowerLid1), Point2D::new(1.0, 1.0));
    }

    #[test]
    fn test_five_points_rejected() {
        let points = &six_points()[..5];
        let err = EyeLandmarks::try_from(points).unwrap_err();
        assert!(matches!(
            err,
            DmsError::InvalidLandmarkSet {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn test_seven_points_rejected() {
        let mut points = six_points();
        points.push(Point2D::default());
        assert!(EyeLandmarks::new(&points).is_err());
    }

    #[test]
    fn test_non_finite_points_rejected() {
        let mut points = six_points();
        points[3] = Point2D::new(f32::INFINITY, 0.0);
        assert!(matches!(
            EyeLandmarks::new(&points),
            Err(DmsError::NonFiniteLandmark { position: 3 })
        ));

        let mut points = six_points();
        points[1] = Point2D::new(1.0, f32::NAN);
        assert!(matches!(
            EyeLandmarks::new(&points),
            Err(DmsError::NonFiniteLandmark { position: 1 })
        ));
    }

    #[test]
    fn test_normalized_overflow_rejected() {
        // Finite in normalized space, infinite once scaled to pixels
        let mut points = six_points();
        points[0] = Point2D::new(f32::MAX, 0.0);
        let face = FaceLandmarks::new(points, CoordinateSpace::Normalized).to_pixels(640, 480);
        assert!(matches!(
            face.eye(&[0, 1, 2, 3, 4, 5]),
            Err(DmsError::NonFiniteLandmark { position: 0 })
        ));
    }

    #[test]
    fn test_role_positions_match_order() {
        for (i, role) in EyeRole::ALL.iter().enumerate() {
            assert_eq!(role.position(), i);
        }
    }

    #[test]
    fn test_normalized_to_pixels() {
        let face = FaceLandmarks::new(
            vec![Point2D::new(0.5, 0.25), Point2D::new(1.0, 1.0)],
            CoordinateSpace::Normalized,
        );
        let pixels = face.to_pixels(640, 480);
        assert_eq!(pixels.space, CoordinateSpace::Pixel);
        assert_eq!(pixels.points[0], Point2D::new(320.0, 120.0));
        assert_eq!(pixels.points[1], Point2D::new(640.0, 480.0));

        // Already in pixels: untouched
        assert_eq!(pixels.to_pixels(10, 10), pixels);
    }

    #[test]
    fn test_eye_selection_by_index() {
        let points: Vec<Point2D> = (0..10).map(|i| Point2D::new(i as f32, 0.0)).collect();
        let face = FaceLandmarks::new(points, CoordinateSpace::Pixel);

        let eye = face.eye(&[9, 8, 7, 6, 5, 4]).unwrap();
        assert_eq!(eye.point(EyeRole::OuterCorner).x, 9.0);
        assert_eq!(eye.point(EyeRole::LowerLid1).x, 4.0);
    }

    #[test]
    fn test_eye_selection_missing_index() {
        let points: Vec<Point2D> = (0..10).map(|i| Point2D::new(i as f32, 0.0)).collect();
        let face = FaceLandmarks::new(points, CoordinateSpace::Pixel);

        let err = face.eye(&[0, 1, 2, 3, 4, 42]).unwrap_err();
        assert!(matches!(err, DmsError::InvalidLandmarkSet { actual: 5, .. }));
    }

    #[test]
    fn test_mediapipe_map() {
        let map = EyeIndexMap::default();
        assert_eq!(map.right[0], 33);
        assert_eq!(map.left[3], 263);
        assert_eq!(map.max_index(), 387);
    }
}
