// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use landscape_config::{AxisRange, DeterminismConfig, GridConfig, LandscapeConfig};
use ndarray::{array, ArrayD, IxDyn};
use st_landscape::{
    pipeline, CoordinateAxis, CrunchOptions, Direction, DirectionSet, DirectionStore, EvalSet,
    Evaluation, FieldKeys, LandscapeError, LandscapeResult, OpenMode, Parameter, SoftmaxProbe,
    SurfaceEvaluator, SurfaceFile, SurfaceGrid, SurfaceModel, SENTINEL,
};
use tempfile::tempdir;

/// Loss is the squared norm of all weights; optionally fails after a
/// number of evaluations or turns NaN once the weight sum passes a bound.
struct Quadratic {
    kernel: Parameter,
    bias: Parameter,
    calls: usize,
    fail_after: Option<usize>,
    nan_above: Option<f64>,
}

impl Quadratic {
    fn new() -> Self {
        Self {
            kernel: Parameter::new("conv::kernel", ArrayD::zeros(IxDyn(&[3, 3, 1, 2]))),
            bias: Parameter::new("conv::bias", ArrayD::zeros(IxDyn(&[2]))),
            calls: 0,
            fail_after: None,
            nan_above: None,
        }
    }

    fn failing_after(calls: usize) -> Self {
        Self {
            fail_after: Some(calls),
            ..Self::new()
        }
    }

    fn nan_above(bound: f64) -> Self {
        Self {
            nan_above: Some(bound),
            ..Self::new()
        }
    }
}

impl SurfaceModel for Quadratic {
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()> {
        visitor(&self.kernel)?;
        visitor(&self.bias)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> LandscapeResult<()>,
    ) -> LandscapeResult<()> {
        visitor(&mut self.kernel)?;
        visitor(&mut self.bias)
    }

    fn evaluate(&mut self, _data: &EvalSet, _batch_size: usize) -> LandscapeResult<Evaluation> {
        if self.fail_after == Some(self.calls) {
            return Err(LandscapeError::model("device lost"));
        }
        self.calls += 1;
        let sum: f64 = self.kernel.value().iter().map(|&w| f64::from(w)).sum();
        if self.nan_above.is_some_and(|bound| sum > bound) {
            return Ok(Evaluation {
                loss: f64::NAN,
                accuracy: 1.0,
            });
        }
        let loss = self
            .kernel
            .value()
            .iter()
            .chain(self.bias.value().iter())
            .map(|&w| f64::from(w) * f64::from(w))
            .sum();
        Ok(Evaluation { loss, accuracy: 1.0 })
    }
}

fn ones_direction() -> Direction {
    Direction::new(vec![
        ArrayD::ones(IxDyn(&[3, 3, 1, 2])),
        ArrayD::zeros(IxDyn(&[2])),
    ])
}

fn data() -> EvalSet {
    EvalSet::new(array![[0.0f32]], vec![0]).unwrap()
}

fn one_d_set() -> DirectionSet {
    DirectionSet {
        model: "quadratic".to_string(),
        x: ones_direction(),
        y: None,
    }
}

fn five_point_grid() -> SurfaceGrid {
    SurfaceGrid::one_dimensional(CoordinateAxis::linspace(-1.0, 1.0, 5).unwrap())
}

#[test]
fn quadratic_loss_along_one_direction() {
    let dir = tempdir().unwrap();
    let dir_path = dir.path().join("quadratic_1D.json");
    let surf_path = dir.path().join("quadratic_1D_surface.json");

    let mut store = DirectionStore::create(&dir_path, "quadratic");
    store.write_set(&one_d_set());
    store.save().unwrap();
    let directions = DirectionStore::open(&dir_path).unwrap().read_set().unwrap();

    let mut model = Quadratic::new();
    let mut surface = SurfaceFile::create(
        &surf_path,
        dir_path.to_string_lossy(),
        five_point_grid(),
        OpenMode::Create,
    )
    .unwrap();
    let mut evaluator = SurfaceEvaluator::new(model.snapshot().unwrap(), directions).unwrap();
    let report = evaluator
        .crunch(&mut surface, &mut model, &data(), &FieldKeys::default(), CrunchOptions::default())
        .unwrap();
    assert_eq!(report.evaluated, 5);

    let reopened = SurfaceFile::open(&surf_path).unwrap();
    let loss = reopened.field("train_loss").unwrap();
    assert_eq!(loss.as_slice().unwrap(), &[18.0, 4.5, 0.0, 4.5, 18.0]);
    assert_eq!(reopened.pending("train_acc").unwrap(), 0);
    assert_eq!(reopened.dir_path(), dir_path.to_string_lossy());
}

#[test]
fn populated_surface_is_left_alone() {
    let dir = tempdir().unwrap();
    let surf_path = dir.path().join("surface.bin");
    let mut model = Quadratic::new();
    let mut evaluator = SurfaceEvaluator::new(model.snapshot().unwrap(), one_d_set()).unwrap();
    let mut surface =
        SurfaceFile::create(&surf_path, "dirs.bin", five_point_grid(), OpenMode::Create).unwrap();
    evaluator
        .crunch(&mut surface, &mut model, &data(), &FieldKeys::default(), CrunchOptions::default())
        .unwrap();
    let before = SurfaceFile::open(&surf_path).unwrap().field("train_loss").unwrap().clone();

    let mut fresh = Quadratic::new();
    let mut resumed =
        SurfaceFile::create(&surf_path, "dirs.bin", five_point_grid(), OpenMode::Resume).unwrap();
    let report = evaluator
        .crunch(&mut resumed, &mut fresh, &data(), &FieldKeys::default(), CrunchOptions::default())
        .unwrap();
    assert_eq!((report.evaluated, report.skipped), (0, 5));
    assert_eq!(fresh.calls, 0);
    assert_eq!(resumed.field("train_loss").unwrap(), &before);
}

#[test]
fn interrupted_crunch_resumes_where_it_stopped() {
    let dir = tempdir().unwrap();
    let surf_path = dir.path().join("surface.bin");
    let mut evaluator =
        SurfaceEvaluator::new(Quadratic::new().snapshot().unwrap(), one_d_set()).unwrap();

    let mut flaky = Quadratic::failing_after(2);
    let mut surface =
        SurfaceFile::create(&surf_path, "dirs.bin", five_point_grid(), OpenMode::Create).unwrap();
    let options = CrunchOptions {
        batch_size: 16,
        checkpoint_every: 4,
    };
    let err = evaluator
        .crunch(&mut surface, &mut flaky, &data(), &FieldKeys::default(), options)
        .unwrap_err();
    assert!(matches!(err, LandscapeError::Model { .. }));

    let on_disk = SurfaceFile::open(&surf_path).unwrap();
    let loss = on_disk.field("train_loss").unwrap();
    assert_eq!(loss.as_slice().unwrap(), &[18.0, 4.5, SENTINEL, SENTINEL, SENTINEL]);

    let mut healthy = Quadratic::new();
    let mut resumed =
        SurfaceFile::create(&surf_path, "dirs.bin", five_point_grid(), OpenMode::Resume).unwrap();
    let report = evaluator
        .crunch(&mut resumed, &mut healthy, &data(), &FieldKeys::default(), options)
        .unwrap();
    assert_eq!((report.evaluated, report.skipped), (3, 2));
    assert_eq!(healthy.calls, 3);
    let loss = SurfaceFile::open(&surf_path).unwrap().field("train_loss").unwrap().clone();
    assert_eq!(loss.as_slice().unwrap(), &[18.0, 4.5, 0.0, 4.5, 18.0]);
}

#[test]
fn non_finite_loss_stops_a_json_crunch_but_not_a_bincode_one() {
    let dir = tempdir().unwrap();
    let json_path = dir.path().join("s.json");
    let mut model = Quadratic::nan_above(0.5);
    let mut evaluator = SurfaceEvaluator::new(model.snapshot().unwrap(), one_d_set()).unwrap();
    let mut surface =
        SurfaceFile::create(&json_path, "dirs.json", five_point_grid(), OpenMode::Create).unwrap();
    let options = CrunchOptions {
        batch_size: 16,
        checkpoint_every: 4,
    };
    let err = evaluator
        .crunch(&mut surface, &mut model, &data(), &FieldKeys::default(), options)
        .unwrap_err();
    assert!(matches!(err, LandscapeError::InvalidField { ref name, .. } if name == "train_loss"));
    assert_eq!(model.calls, 4);

    let on_disk = SurfaceFile::open(&json_path).unwrap();
    let loss = on_disk.field("train_loss").unwrap();
    assert_eq!(loss.as_slice().unwrap(), &[18.0, 4.5, 0.0, SENTINEL, SENTINEL]);

    let bin_path = dir.path().join("s.bin");
    let mut model = Quadratic::nan_above(0.5);
    let mut surface =
        SurfaceFile::create(&bin_path, "dirs.bin", five_point_grid(), OpenMode::Create).unwrap();
    let report = evaluator
        .crunch(&mut surface, &mut model, &data(), &FieldKeys::default(), options)
        .unwrap();
    assert_eq!(report.evaluated, 5);
    let loss = SurfaceFile::open(&bin_path).unwrap().field("train_loss").unwrap().clone();
    assert_eq!(loss[[2]], 0.0);
    assert!(loss[[3]].is_nan() && loss[[4]].is_nan());
}

#[test]
fn two_dimensional_crunch_adds_both_displacements() {
    let dir = tempdir().unwrap();
    let axis = CoordinateAxis::linspace(-1.0, 1.0, 3).unwrap();
    let grid = SurfaceGrid::two_dimensional(axis.clone(), axis);
    let mut surface =
        SurfaceFile::create(dir.path().join("s.bin"), "d.bin", grid, OpenMode::Create).unwrap();
    let y = Direction::new(vec![
        ArrayD::zeros(IxDyn(&[3, 3, 1, 2])),
        ArrayD::ones(IxDyn(&[2])),
    ]);
    let set = DirectionSet {
        model: "quadratic".to_string(),
        x: ones_direction(),
        y: Some(y),
    };
    let mut model = Quadratic::new();
    let mut evaluator = SurfaceEvaluator::new(model.snapshot().unwrap(), set).unwrap();
    let keys = FieldKeys::new("test_loss", "test_acc");
    evaluator
        .crunch(&mut surface, &mut model, &data(), &keys, CrunchOptions::default())
        .unwrap();

    let loss = surface.field("test_loss").unwrap();
    assert_eq!(loss.shape(), &[3, 3]);
    // 18·cx² from the kernel plus 2·cy² from the bias.
    assert_eq!(loss[[0, 0]], 20.0);
    assert_eq!(loss[[0, 1]], 18.0);
    assert_eq!(loss[[1, 2]], 2.0);
    assert_eq!(loss[[1, 1]], 0.0);
    assert!(!surface.contains("train_loss"));
}

#[test]
fn pipeline_runs_a_probe_and_resumes() {
    let dir = tempdir().unwrap();
    let config = LandscapeConfig {
        grid: GridConfig {
            x: AxisRange::new(-0.5, 0.5, 5),
            y: Some(AxisRange::new(-0.5, 0.5, 3)),
        },
        ..LandscapeConfig::default()
    };
    let determinism = DeterminismConfig::seeded(7);
    let data = EvalSet::new(
        array![[1.0f32, 0.0], [0.0, 1.0], [0.5, 0.5], [1.0, 1.0]],
        vec![0, 1, 0, 1],
    )
    .unwrap();
    let mut probe = SoftmaxProbe::new("probe", 2, 2).unwrap();
    let baseline = probe.snapshot().unwrap();

    let output =
        pipeline::run(&config, &determinism, &mut probe, "probe", &data, dir.path()).unwrap();
    assert!(output.directions.ends_with("probe_2D.bin"));
    assert!(output.surface.ends_with("probe_2D_surface.bin"));
    assert_eq!(output.report.evaluated, 15);
    assert_eq!(probe.snapshot().unwrap(), baseline);

    let surface = SurfaceFile::open(&output.surface).unwrap();
    assert_eq!(surface.pending("train_loss").unwrap(), 0);
    let center = surface.field("train_loss").unwrap()[[2, 1]];
    let at_base = probe.evaluate(&data, 128).unwrap().loss;
    assert!((center - at_base).abs() < 1e-12);

    let again =
        pipeline::run(&config, &determinism, &mut probe, "probe", &data, dir.path()).unwrap();
    assert_eq!((again.report.evaluated, again.report.skipped), (0, 15));
}

#[test]
fn pipeline_rejects_invalid_configuration() {
    let dir = tempdir().unwrap();
    let mut config = LandscapeConfig::default();
    config.grid.x = AxisRange::new(1.0, 1.0, 3);
    let data = EvalSet::new(array![[0.0f32]], vec![0]).unwrap();
    let mut model = Quadratic::new();
    let err = pipeline::run(
        &config,
        &DeterminismConfig::default(),
        &mut model,
        "quadratic",
        &data,
        dir.path(),
    )
    .unwrap_err();
    assert!(matches!(err, LandscapeError::Config(_)));
}
