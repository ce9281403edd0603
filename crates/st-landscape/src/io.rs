// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Record codecs shared by direction stores, surface files and probe state.

use crate::error::{LandscapeError, LandscapeResult};
use crate::model::{Parameter, SurfaceModel};
use ndarray::{ArrayD, IxDyn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// On-disk encoding, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Bincode,
}

impl Format {
    pub fn for_path(path: &Path) -> Format {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Bincode,
        }
    }
}

/// Dense row-major array with its shape, the unit stored for every
/// parameter, direction entry and surface field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredArray<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T: Clone> StoredArray<T> {
    pub fn from_array(array: &ArrayD<T>) -> Self {
        StoredArray {
            shape: array.shape().to_vec(),
            data: array.iter().cloned().collect(),
        }
    }

    pub fn into_array(self) -> LandscapeResult<ArrayD<T>> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(LandscapeError::Serialization {
                message: format!(
                    "stored array of shape {:?} holds {} values, expected {expected}",
                    self.shape,
                    self.data.len()
                ),
            });
        }
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data).map_err(serde_error)
    }
}

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> LandscapeError + '_ {
    move |source| LandscapeError::Io {
        path: path.to_path_buf(),
        source,
    }
}

pub(crate) fn serde_error(err: impl ToString) -> LandscapeError {
    LandscapeError::Serialization {
        message: err.to_string(),
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(".partial");
    PathBuf::from(raw)
}

/// Writes `record` to a sibling `.partial` file, syncs it, and renames it
/// over `path`, so readers only ever observe complete checkpoints.
pub fn write_record<T: Serialize, P: AsRef<Path>>(record: &T, path: P) -> LandscapeResult<()> {
    let path = path.as_ref();
    let staging = partial_path(path);
    let file = File::create(&staging).map_err(io_error(&staging))?;
    let mut writer = BufWriter::new(file);
    match Format::for_path(path) {
        Format::Json => serde_json::to_writer_pretty(&mut writer, record).map_err(serde_error)?,
        Format::Bincode => bincode::serialize_into(&mut writer, record).map_err(serde_error)?,
    }
    writer.flush().map_err(io_error(&staging))?;
    let file = writer
        .into_inner()
        .map_err(|err| LandscapeError::Io {
            path: staging.clone(),
            source: err.into_error(),
        })?;
    file.sync_all().map_err(io_error(&staging))?;
    fs::rename(&staging, path).map_err(io_error(path))?;
    Ok(())
}

pub fn read_record<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> LandscapeResult<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(io_error(path))?;
    let reader = BufReader::new(file);
    match Format::for_path(path) {
        Format::Json => serde_json::from_reader(reader).map_err(serde_error),
        Format::Bincode => bincode::deserialize_from(reader).map_err(serde_error),
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredParameter {
    name: String,
    shape: Vec<usize>,
    data: Vec<f32>,
}

/// Ordered parameter list, the persisted form of a model's weights.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModelState {
    parameters: Vec<StoredParameter>,
}

/// Saves every parameter of `model` in canonical order.
pub fn save_state<M: SurfaceModel + ?Sized, P: AsRef<Path>>(
    model: &M,
    path: P,
) -> LandscapeResult<()> {
    let mut parameters = Vec::new();
    model.visit_parameters(&mut |param: &Parameter| {
        let stored = StoredArray::from_array(param.value());
        parameters.push(StoredParameter {
            name: param.name().to_string(),
            shape: stored.shape,
            data: stored.data,
        });
        Ok(())
    })?;
    write_record(&ModelState { parameters }, path)
}

/// Reads a saved parameter list in its stored order.
pub fn read_parameters<P: AsRef<Path>>(path: P) -> LandscapeResult<Vec<Parameter>> {
    let state: ModelState = read_record(path)?;
    state
        .parameters
        .into_iter()
        .map(|stored| {
            let value = StoredArray {
                shape: stored.shape,
                data: stored.data,
            }
            .into_array()?;
            Ok(Parameter::new(stored.name, value))
        })
        .collect()
}

/// Restores parameters by name. Every model parameter must be present with
/// a matching shape.
pub fn load_state<M: SurfaceModel + ?Sized, P: AsRef<Path>>(
    model: &mut M,
    path: P,
) -> LandscapeResult<()> {
    let by_name: HashMap<String, ArrayD<f32>> = read_parameters(path)?
        .into_iter()
        .map(|param| (param.name().to_string(), param.value().clone()))
        .collect();
    model.visit_parameters_mut(&mut |param| {
        let Some(value) = by_name.get(param.name()) else {
            return Err(LandscapeError::Serialization {
                message: format!("parameter {} missing from saved state", param.name()),
            });
        };
        param.load_value(value)
    })
}
