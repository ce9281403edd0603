// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{LandscapeError, LandscapeResult};
use crate::grid::{CoordinateAxis, SurfaceGrid};
use crate::io::{read_record, write_record, Format, StoredArray};
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Marks a grid point that has not been evaluated yet.
pub const SENTINEL: f64 = -1.0;

/// What to do when the surface file already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Fail with `AlreadyExists`.
    Create,
    /// Reuse the file; its axes must match the requested grid.
    Resume,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SurfaceRecord {
    dir_path: String,
    xcoordinates: Vec<f64>,
    ycoordinates: Option<Vec<f64>>,
    fields: BTreeMap<String, StoredArray<f64>>,
}

/// Persisted surface: direction reference, axes and named scalar fields.
///
/// Edits happen in memory; [`SurfaceFile::flush`] is the checkpoint
/// boundary that makes them durable.
#[derive(Debug)]
pub struct SurfaceFile {
    path: PathBuf,
    dir_path: String,
    grid: SurfaceGrid,
    fields: BTreeMap<String, ArrayD<f64>>,
}

impl SurfaceFile {
    /// Creates the file at `path` for `grid`, or reopens it in
    /// [`OpenMode::Resume`].
    pub fn create(
        path: impl Into<PathBuf>,
        dir_path: impl Into<String>,
        grid: SurfaceGrid,
        mode: OpenMode,
    ) -> LandscapeResult<Self> {
        let path = path.into();
        let dir_path = dir_path.into();
        if path.exists() {
            if mode == OpenMode::Create {
                return Err(LandscapeError::AlreadyExists { path });
            }
            let existing = Self::open(&path)?;
            if existing.grid.x() != grid.x() {
                return Err(LandscapeError::GridMismatch { path, axis: "x" });
            }
            if existing.grid.y() != grid.y() {
                return Err(LandscapeError::GridMismatch { path, axis: "y" });
            }
            if existing.dir_path != dir_path {
                warn!(
                    surface = %path.display(),
                    stored = %existing.dir_path,
                    requested = %dir_path,
                    "resuming surface recorded against another direction file"
                );
            }
            return Ok(existing);
        }
        let surface = Self {
            path,
            dir_path,
            grid,
            fields: BTreeMap::new(),
        };
        surface.flush()?;
        Ok(surface)
    }

    pub fn open(path: impl Into<PathBuf>) -> LandscapeResult<Self> {
        let path = path.into();
        let record: SurfaceRecord = read_record(&path)?;
        let x = CoordinateAxis::from_steps(record.xcoordinates)?;
        let grid = match record.ycoordinates {
            Some(y) => SurfaceGrid::two_dimensional(x, CoordinateAxis::from_steps(y)?),
            None => SurfaceGrid::one_dimensional(x),
        };
        let shape = grid.shape();
        let mut fields = BTreeMap::new();
        for (name, stored) in record.fields {
            let array = stored.into_array()?;
            if array.shape() != shape.as_slice() {
                return Err(LandscapeError::shape(
                    format!("field {name} of {}", path.display()),
                    &shape,
                    array.shape(),
                ));
            }
            fields.insert(name, array);
        }
        Ok(Self {
            path,
            dir_path: record.dir_path,
            grid,
            fields,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reference to the direction file the surface was evaluated along.
    pub fn dir_path(&self) -> &str {
        &self.dir_path
    }

    pub fn grid(&self) -> &SurfaceGrid {
        &self.grid
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn field(&self, name: &str) -> LandscapeResult<&ArrayD<f64>> {
        self.fields.get(name).ok_or_else(|| self.unknown(name))
    }

    pub fn field_mut(&mut self, name: &str) -> LandscapeResult<&mut ArrayD<f64>> {
        let path = &self.path;
        self.fields
            .get_mut(name)
            .ok_or_else(|| LandscapeError::UnknownField {
                name: name.to_string(),
                path: path.clone(),
            })
    }

    /// Returns the field, creating it filled with [`SENTINEL`] when absent.
    pub fn ensure_field(&mut self, name: &str) -> LandscapeResult<&mut ArrayD<f64>> {
        let shape = self.grid.shape();
        let field = self
            .fields
            .entry(name.to_string())
            .or_insert_with(|| ArrayD::from_elem(IxDyn(&shape), SENTINEL));
        if field.shape() != shape.as_slice() {
            return Err(LandscapeError::shape(format!("field {name}"), &shape, field.shape()));
        }
        Ok(field)
    }

    /// Inserts or overwrites a field. Its shape must equal the grid shape.
    pub fn set_field(&mut self, name: &str, values: ArrayD<f64>) -> LandscapeResult<()> {
        let shape = self.grid.shape();
        if values.shape() != shape.as_slice() {
            return Err(LandscapeError::shape(format!("field {name}"), &shape, values.shape()));
        }
        self.fields.insert(name.to_string(), values);
        Ok(())
    }

    /// Number of entries of `name` still holding the sentinel.
    pub fn pending(&self, name: &str) -> LandscapeResult<usize> {
        Ok(self.field(name)?.iter().filter(|&&v| v == SENTINEL).count())
    }

    /// Whether `value` survives a flush to this file's format.
    pub fn can_store(&self, value: f64) -> bool {
        value.is_finite() || Format::for_path(&self.path) != Format::Json
    }

    /// Writes the whole surface atomically.
    ///
    /// JSON has no encoding for NaN or infinities, so a `.json` surface
    /// holding a non-finite value is refused before anything is written.
    pub fn flush(&self) -> LandscapeResult<()> {
        for (name, field) in &self.fields {
            if let Some(bad) = field.iter().find(|&&v| !self.can_store(v)) {
                return Err(LandscapeError::InvalidField {
                    name: name.clone(),
                    reason: format!(
                        "value {bad} cannot be stored in JSON surface {}; use a bincode extension",
                        self.path.display()
                    ),
                });
            }
        }
        let record = SurfaceRecord {
            dir_path: self.dir_path.clone(),
            xcoordinates: self.grid.x().steps().to_vec(),
            ycoordinates: self.grid.y().map(|y| y.steps().to_vec()),
            fields: self
                .fields
                .iter()
                .map(|(name, field)| (name.clone(), StoredArray::from_array(field)))
                .collect(),
        };
        write_record(&record, &self.path)?;
        debug!(surface = %self.path.display(), fields = self.fields.len(), "surface flushed");
        Ok(())
    }

    fn unknown(&self, name: &str) -> LandscapeError {
        LandscapeError::UnknownField {
            name: name.to_string(),
            path: self.path.clone(),
        }
    }
}
