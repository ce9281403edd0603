// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LandscapeError, LandscapeResult};
use landscape_config::{AxisRange, GridConfig};

/// Immutable ordered list of step sizes along one direction.
#[derive(Clone, Debug, PartialEq)]
pub struct CoordinateAxis {
    steps: Vec<f64>,
}

impl CoordinateAxis {
    /// `count` evenly spaced steps from `min` to `max`, both included.
    pub fn linspace(min: f64, max: f64, count: usize) -> LandscapeResult<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(LandscapeError::InvalidAxis {
                reason: format!("bounds must be finite, got [{min}, {max}]"),
            });
        }
        if min == max {
            return Err(LandscapeError::InvalidAxis {
                reason: format!("bounds must differ, got {min} twice"),
            });
        }
        if count < 2 {
            return Err(LandscapeError::InvalidAxis {
                reason: format!("at least 2 points are required, got {count}"),
            });
        }
        let span = max - min;
        let last = (count - 1) as f64;
        let mut steps: Vec<f64> = (0..count).map(|i| min + span * (i as f64 / last)).collect();
        steps[count - 1] = max;
        Ok(Self { steps })
    }

    pub fn from_range(range: &AxisRange) -> LandscapeResult<Self> {
        Self::linspace(range.min, range.max, range.num)
    }

    /// Rebuilds an axis from persisted steps.
    pub fn from_steps(steps: Vec<f64>) -> LandscapeResult<Self> {
        if steps.is_empty() {
            return Err(LandscapeError::InvalidAxis {
                reason: "axis has no steps".to_string(),
            });
        }
        if let Some(bad) = steps.iter().find(|v| !v.is_finite()) {
            return Err(LandscapeError::InvalidAxis {
                reason: format!("non-finite step {bad}"),
            });
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[f64] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Index of the middle step when the axis has an odd length.
    pub fn center(&self) -> Option<usize> {
        (self.len() % 2 == 1).then_some(self.len() / 2)
    }
}

/// One evaluation site of the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridPoint {
    /// Position in the field, `[i]` or `[i, j]`.
    pub index: Vec<usize>,
    pub x: f64,
    pub y: Option<f64>,
}

/// The axes indexing a surface: `x` alone (1D) or `x` × `y` (2D).
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceGrid {
    x: CoordinateAxis,
    y: Option<CoordinateAxis>,
}

impl SurfaceGrid {
    pub fn one_dimensional(x: CoordinateAxis) -> Self {
        Self { x, y: None }
    }

    pub fn two_dimensional(x: CoordinateAxis, y: CoordinateAxis) -> Self {
        Self { x, y: Some(y) }
    }

    pub fn from_config(config: &GridConfig) -> LandscapeResult<Self> {
        let x = CoordinateAxis::from_range(&config.x)?;
        let y = config.y.as_ref().map(CoordinateAxis::from_range).transpose()?;
        Ok(Self { x, y })
    }

    pub fn x(&self) -> &CoordinateAxis {
        &self.x
    }

    pub fn y(&self) -> Option<&CoordinateAxis> {
        self.y.as_ref()
    }

    pub fn is_two_dimensional(&self) -> bool {
        self.y.is_some()
    }

    /// Field shape: `[nx]` or `[nx, ny]`.
    pub fn shape(&self) -> Vec<usize> {
        match &self.y {
            Some(y) => vec![self.x.len(), y.len()],
            None => vec![self.x.len()],
        }
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every grid point in row-major order (`x` outer, `y` inner).
    pub fn points(&self) -> impl Iterator<Item = GridPoint> + '_ {
        let ny = self.y.as_ref().map_or(1, CoordinateAxis::len);
        (0..self.len()).map(move |flat| {
            let i = flat / ny;
            match &self.y {
                Some(y) => {
                    let j = flat % ny;
                    GridPoint {
                        index: vec![i, j],
                        x: self.x.steps[i],
                        y: Some(y.steps[j]),
                    }
                }
                None => GridPoint {
                    index: vec![i],
                    x: self.x.steps[i],
                    y: None,
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_is_inclusive_and_even() {
        let axis = CoordinateAxis::linspace(-1.0, 1.0, 5).unwrap();
        assert_eq!(axis.steps(), &[-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(axis.center(), Some(2));

        let even = CoordinateAxis::linspace(0.0, 1.0, 4).unwrap();
        assert_eq!(even.center(), None);
        assert_eq!(even.steps()[3], 1.0);
    }

    #[test]
    fn degenerate_axes_are_rejected() {
        assert!(CoordinateAxis::linspace(-1.0, 1.0, 1).is_err());
        assert!(CoordinateAxis::linspace(0.5, 0.5, 11).is_err());
        assert!(CoordinateAxis::linspace(f64::NAN, 1.0, 11).is_err());
        assert!(CoordinateAxis::from_steps(vec![]).is_err());
    }

    #[test]
    fn points_walk_rows_then_columns() {
        let grid = SurfaceGrid::two_dimensional(
            CoordinateAxis::linspace(0.0, 1.0, 2).unwrap(),
            CoordinateAxis::linspace(-1.0, 1.0, 3).unwrap(),
        );
        assert_eq!(grid.shape(), vec![2, 3]);
        let points: Vec<GridPoint> = grid.points().collect();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0].index, vec![0, 0]);
        assert_eq!(points[2].index, vec![0, 2]);
        assert_eq!(points[3].index, vec![1, 0]);
        assert_eq!((points[4].x, points[4].y), (1.0, Some(0.0)));
    }

    #[test]
    fn config_builds_matching_grid() {
        let config = GridConfig {
            x: AxisRange::new(-1.0, 1.0, 51),
            y: Some(AxisRange::new(-0.2, 0.2, 41)),
        };
        let grid = SurfaceGrid::from_config(&config).unwrap();
        assert_eq!(grid.shape(), vec![51, 41]);
        assert_eq!(grid.len(), 51 * 41);
    }
}
