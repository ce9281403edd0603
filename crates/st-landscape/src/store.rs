// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::direction::{Direction, DirectionSet};
use crate::error::{LandscapeError, LandscapeResult};
use crate::io::{read_record, write_record, StoredArray};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const X_AXIS: &str = "x";
pub const Y_AXIS: &str = "y";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct DirectionRecord {
    model: String,
    groups: BTreeMap<String, Vec<StoredArray<f32>>>,
}

fn group_name(axis: &str) -> String {
    format!("{axis}direction")
}

/// Direction file: named, ordered tensor lists keyed by axis label.
///
/// Changes stay in memory until [`DirectionStore::save`].
#[derive(Debug)]
pub struct DirectionStore {
    path: PathBuf,
    record: DirectionRecord,
}

impl DirectionStore {
    /// Starts a new, empty store that will be written to `path`.
    pub fn create(path: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            record: DirectionRecord {
                model: model.into(),
                groups: BTreeMap::new(),
            },
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> LandscapeResult<Self> {
        let path = path.into();
        let record = read_record(&path)?;
        Ok(Self { path, record })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Back-reference to the model the directions were drawn for.
    pub fn model(&self) -> &str {
        &self.record.model
    }

    pub fn contains(&self, axis: &str) -> bool {
        self.record.groups.contains_key(&group_name(axis))
    }

    pub fn write(&mut self, axis: &str, direction: &Direction) {
        let arrays = direction
            .tensors()
            .iter()
            .map(StoredArray::from_array)
            .collect();
        self.record.groups.insert(group_name(axis), arrays);
    }

    pub fn read(&self, axis: &str) -> LandscapeResult<Direction> {
        let arrays = self
            .record
            .groups
            .get(&group_name(axis))
            .ok_or_else(|| LandscapeError::MissingAxis {
                label: axis.to_string(),
            })?;
        let tensors = arrays
            .iter()
            .cloned()
            .map(StoredArray::into_array)
            .collect::<LandscapeResult<Vec<_>>>()?;
        Ok(Direction::new(tensors))
    }

    /// Stores `x` and, when present, `y`. A stale `y` group from an earlier
    /// 2D set is dropped when `set` is one-dimensional.
    pub fn write_set(&mut self, set: &DirectionSet) {
        self.record.model = set.model.clone();
        self.write(X_AXIS, &set.x);
        match &set.y {
            Some(y) => self.write(Y_AXIS, y),
            None => {
                self.record.groups.remove(&group_name(Y_AXIS));
            }
        }
    }

    pub fn read_set(&self) -> LandscapeResult<DirectionSet> {
        let x = self.read(X_AXIS)?;
        let y = if self.contains(Y_AXIS) {
            Some(self.read(Y_AXIS)?)
        } else {
            None
        };
        Ok(DirectionSet {
            model: self.record.model.clone(),
            x,
            y,
        })
    }

    pub fn save(&self) -> LandscapeResult<()> {
        write_record(&self.record, &self.path)
    }
}
