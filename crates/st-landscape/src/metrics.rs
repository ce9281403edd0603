// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Differential-geometry diagnostics over 2D surface fields.
//!
//! Derivatives use unit spacing: central differences in the interior and
//! first-order one-sided differences on the borders.

use crate::error::{LandscapeError, LandscapeResult};
use crate::surface::SurfaceFile;
use ndarray::{Array2, ArrayD, ArrayView2, Axis, Ix2, Zip};
use std::fmt;
use tracing::info;

pub const ZEROS_SUFFIX: &str = "_zeros";
pub const CURVATURE_SUFFIX: &str = "_curv";
pub const ANGLE_SUFFIX: &str = "_angle";

/// Partial derivatives `(d/drow, d/dcol)` of `z`. Both axes need at least
/// two points.
pub fn gradient(z: ArrayView2<'_, f64>) -> (Array2<f64>, Array2<f64>) {
    (diff_along(z, Axis(0)), diff_along(z, Axis(1)))
}

fn diff_along(z: ArrayView2<'_, f64>, axis: Axis) -> Array2<f64> {
    let mut out = Array2::zeros(z.raw_dim());
    for (src, mut dst) in z.lanes(axis).into_iter().zip(out.lanes_mut(axis)) {
        let n = src.len();
        if n < 2 {
            continue;
        }
        dst[0] = src[1] - src[0];
        dst[n - 1] = src[n - 1] - src[n - 2];
        for i in 1..n - 1 {
            dst[i] = (src[i + 1] - src[i - 1]) * 0.5;
        }
    }
    out
}

/// Mean curvature of the graph of `z`.
pub fn curvature(z: ArrayView2<'_, f64>) -> Array2<f64> {
    let (dx, dy) = gradient(z);
    let (dxx, dxy) = gradient(dx.view());
    let (_, dyy) = gradient(dy.view());
    let mut curv = Array2::zeros(z.raw_dim());
    Zip::from(&mut curv)
        .and(&dx)
        .and(&dy)
        .and(&dxx)
        .and(&dxy)
        .and(&dyy)
        .for_each(|c, &dx, &dy, &dxx, &dxy, &dyy| {
            let nu = (1.0 + dx * dx) * dyy - 2.0 * dx * dy * dxy + (1.0 + dy * dy) * dxx;
            let de = 2.0 * (1.0 + dx * dx + dy * dy).powf(1.5);
            *c = nu / de;
        });
    curv
}

/// Angle between the surface normal `(dx, dy, -1)` and the vertical.
pub fn normal_angle(z: ArrayView2<'_, f64>) -> Array2<f64> {
    let (dx, dy) = gradient(z);
    let mut angle = Array2::zeros(z.raw_dim());
    Zip::from(&mut angle)
        .and(&dx)
        .and(&dy)
        .for_each(|a, &dx, &dy| {
            let norm = (dx * dx + dy * dy + 1.0).sqrt();
            *a = (1.0 / norm).acos();
        });
    angle
}

/// `z - min(z)`, for fields of any rank.
pub fn zero_shift(z: &ArrayD<f64>) -> ArrayD<f64> {
    let min = z.iter().copied().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return z.clone();
    }
    z.mapv(|v| v - min)
}

/// Sharpness indices of one field, taken around its centre point.
#[derive(Clone, Debug, PartialEq)]
pub struct SharpnessReport {
    pub label: String,
    pub center: f64,
    pub max: f64,
    /// `(max - center) / (1 + center) * 100`.
    pub relative: f64,
    /// Mean curvature at the centre, times 100.
    pub curvature: f64,
    /// `(max - center) * 100`.
    pub absolute: f64,
}

impl fmt::Display for SharpnessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Evaluate sharpness of {}:", self.label)?;
        write!(
            f,
            "sharpness 1: {:.6},\tsharpness 2: {:.6}",
            self.relative, self.curvature
        )
    }
}

pub fn sharpness(z: ArrayView2<'_, f64>, label: impl Into<String>) -> LandscapeResult<SharpnessReport> {
    let (rows, cols) = z.dim();
    if rows % 2 == 0 || cols % 2 == 0 {
        return Err(LandscapeError::EvenGrid { rows, cols });
    }
    let label = label.into();
    check_extent(&label, rows, cols)?;
    let centre = (rows / 2, cols / 2);
    let center = z[centre];
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let curv = curvature(z);
    Ok(SharpnessReport {
        label,
        center,
        max,
        relative: (max - center) / (1.0 + center) * 100.0,
        curvature: curv[centre] * 100.0,
        absolute: (max - center) * 100.0,
    })
}

fn check_extent(name: &str, rows: usize, cols: usize) -> LandscapeResult<()> {
    if rows < 2 || cols < 2 {
        return Err(LandscapeError::InvalidField {
            name: name.to_string(),
            reason: format!("derivatives need at least 2 points per axis, got ({rows}, {cols})"),
        });
    }
    Ok(())
}

fn field_2d(surface: &SurfaceFile, name: &str) -> LandscapeResult<Array2<f64>> {
    let field = surface.field(name)?;
    let field = field
        .clone()
        .into_dimensionality::<Ix2>()
        .map_err(|_| LandscapeError::InvalidField {
            name: name.to_string(),
            reason: format!("expected a 2D field, got shape {:?}", field.shape()),
        })?;
    let (rows, cols) = field.dim();
    check_extent(name, rows, cols)?;
    Ok(field)
}

/// Writes `<name>_zeros` into `surface` and flushes it.
pub fn apply_zero_shift(surface: &mut SurfaceFile, name: &str) -> LandscapeResult<()> {
    let shifted = zero_shift(surface.field(name)?);
    write_derived(surface, name, ZEROS_SUFFIX, shifted)
}

/// Writes `<name>_curv` into `surface` and flushes it.
pub fn apply_curvature(surface: &mut SurfaceFile, name: &str) -> LandscapeResult<()> {
    let curv = curvature(field_2d(surface, name)?.view());
    write_derived(surface, name, CURVATURE_SUFFIX, curv.into_dyn())
}

/// Writes `<name>_angle` into `surface` and flushes it.
pub fn apply_angle(surface: &mut SurfaceFile, name: &str) -> LandscapeResult<()> {
    let angle = normal_angle(field_2d(surface, name)?.view());
    write_derived(surface, name, ANGLE_SUFFIX, angle.into_dyn())
}

/// Sharpness of field `name`, labelled with the surface file stem.
pub fn evaluate_sharpness(surface: &SurfaceFile, name: &str) -> LandscapeResult<SharpnessReport> {
    let field = surface.field(name)?;
    let (rows, cols) = match field.shape() {
        [rows, cols] => (*rows, *cols),
        other => {
            return Err(LandscapeError::InvalidField {
                name: name.to_string(),
                reason: format!("expected a 2D field, got shape {other:?}"),
            })
        }
    };
    if rows % 2 == 0 || cols % 2 == 0 {
        return Err(LandscapeError::EvenGrid { rows, cols });
    }
    let label = surface
        .path()
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| surface.path().display().to_string());
    let report = sharpness(field_2d(surface, name)?.view(), label)?;
    info!(
        surface = %surface.path().display(),
        field = name,
        sharpness1 = report.relative,
        sharpness2 = report.curvature,
        sharpness3 = report.absolute,
        "sharpness evaluated"
    );
    Ok(report)
}

fn write_derived(
    surface: &mut SurfaceFile,
    name: &str,
    suffix: &str,
    values: ArrayD<f64>,
) -> LandscapeResult<()> {
    let derived = format!("{name}{suffix}");
    surface.set_field(&derived, values)?;
    surface.flush()?;
    info!(surface = %surface.path().display(), field = %derived, "derived field written");
    Ok(())
}
