use std::{fs, path::PathBuf, time::Instant};

use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use serde::Serialize;

use pcd_core::{
    geometry::StageGeometry,
    pointcloud::point::{BoundingVolume, PointCloud},
};
use pcd_exporter::ply::PlyExporter;
use pcd_parser::parsers::ply::read_ply;
use pcd_transformer::{
    FilterCriteria, FilterReport, RigidTransform, Transform as _, ViewFilter,
};

use crate::{
    error::{MergeError, ViewError},
    job::{ScanLayout, ViewJob},
    reconstruct::Reconstructor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewSource {
    Materialized,
    Reused,
}

#[derive(Debug, Clone, Serialize)]
pub struct ViewReport {
    pub angle_deg: u32,
    pub source: ViewSource,
    pub partial_path: PathBuf,
    pub loaded: usize,
    pub skipped_lines: usize,
    pub filter: FilterReport,
    pub merged: usize,
    /// Bounds in the canonical frame, `None` when nothing survived filtering.
    pub bounding_volume: Option<BoundingVolume>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeReport {
    pub stage: StageGeometry,
    pub criteria: FilterCriteria,
    pub views: Vec<ViewReport>,
    pub total_points: usize,
    pub model_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub cloud: PointCloud,
    pub report: MergeReport,
}

/// Drives every view through materialize/reuse, load, filter and rotate,
/// then writes the concatenation in angle order as the full model.
pub struct MergePipeline<R: Reconstructor> {
    layout: ScanLayout,
    stage: StageGeometry,
    filter: ViewFilter,
    exporter: PlyExporter,
    reconstructor: R,
    jobs: Option<usize>,
}

impl<R: Reconstructor> MergePipeline<R> {
    pub fn new(
        layout: ScanLayout,
        stage: StageGeometry,
        criteria: FilterCriteria,
        reconstructor: R,
    ) -> Self {
        Self {
            layout,
            stage,
            filter: ViewFilter::new(criteria, stage),
            exporter: PlyExporter::default(),
            reconstructor,
            jobs: None,
        }
    }

    pub fn with_exporter(mut self, exporter: PlyExporter) -> Self {
        self.exporter = exporter;
        self
    }

    /// Size of the worker pool; `1` processes the views sequentially.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn run(&self) -> Result<MergeOutput, MergeError> {
        let start = Instant::now();
        fs::create_dir_all(self.layout.results_dir())?;

        let jobs = self.layout.jobs();
        log::info!(
            "merging {} views from {:?} into {:?}",
            jobs.len(),
            self.layout.base_dir,
            self.layout.results_dir
        );

        let merged = if self.jobs == Some(1) {
            jobs.iter()
                .map(|job| self.merge_view(job))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(n) = self.jobs {
                builder = builder.num_threads(n);
            }
            builder
                .build()?
                .install(|| {
                    jobs.par_iter()
                        .map(|job| self.merge_view(job))
                        .collect::<Result<Vec<_>, _>>()
                })?
        };
        let (clouds, views): (Vec<_>, Vec<_>) = merged.into_iter().unzip();

        let cloud = PointCloud::concat(clouds);
        let total_points = cloud.len();

        if cloud.is_empty() {
            log::warn!("no points were generated; writing an empty full model");
        }
        let model_path = self.layout.model_path();
        self.exporter.write(&cloud, &model_path)?;
        log::info!("full model saved to {:?}", model_path);

        log::info!(
            "total points: {} ({:?} elapsed)",
            total_points,
            start.elapsed()
        );

        Ok(MergeOutput {
            cloud,
            report: MergeReport {
                stage: self.stage,
                criteria: *self.filter.criteria(),
                views,
                total_points,
                model_path,
            },
        })
    }

    fn merge_view(&self, job: &ViewJob) -> Result<(PointCloud, ViewReport), MergeError> {
        self.process_view(job)
            .map_err(|e| MergeError::view(job.angle_deg, e))
    }

    fn process_view(&self, job: &ViewJob) -> Result<(PointCloud, ViewReport), ViewError> {
        let source = if job.partial_path.exists() {
            log::info!("view {} deg: reusing {:?}", job.angle_deg, job.partial_path);
            ViewSource::Reused
        } else {
            self.reconstructor.reconstruct(job)?;
            ViewSource::Materialized
        };

        let parsed = read_ply(&job.partial_path)?;
        let (filtered, filter) = self.filter.apply(&parsed.cloud);
        if filter.removed() > 0 {
            log::info!(
                "view {} deg: filtered out {} points (non-finite {}, z range {}, radius {})",
                job.angle_deg,
                filter.removed(),
                filter.removed_non_finite,
                filter.removed_z_range,
                filter.removed_radius
            );
        }

        let rotated =
            RigidTransform::for_view(&self.stage, f64::from(job.angle_deg)).transform(filtered);
        let volume = rotated.metadata.bounding_volume;
        let bounding_volume = (!volume.is_empty()).then_some(volume);

        log::info!("view {} deg: {} points merged", job.angle_deg, rotated.len());
        if let Some(volume) = &bounding_volume {
            log::debug!(
                "view {} deg: bounds min {:?} max {:?}",
                job.angle_deg,
                volume.min,
                volume.max
            );
        }

        let report = ViewReport {
            angle_deg: job.angle_deg,
            source,
            partial_path: job.partial_path.clone(),
            loaded: parsed.cloud.len(),
            skipped_lines: parsed.skipped_lines,
            filter,
            merged: rotated.len(),
            bounding_volume,
        };
        Ok((rotated, report))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use pcd_core::{format::Layout, pointcloud::point::Point};

    use super::*;
    use crate::error::ReconstructionError;

    /// Writes a fixed partial for every view and counts how often it ran.
    #[derive(Default)]
    struct FakeReconstructor {
        calls: AtomicUsize,
        fail_at: Option<u32>,
    }

    impl Reconstructor for FakeReconstructor {
        fn reconstruct(&self, job: &ViewJob) -> Result<(), ReconstructionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(job.angle_deg) {
                return Err(ReconstructionError::MissingOutput(job.partial_path.clone()));
            }
            write_partial(&job.partial_path, &view_points(job.angle_deg));
            Ok(())
        }
    }

    fn write_partial(path: &Path, points: &[Point]) {
        PlyExporter::new(Layout::Ascii)
            .write(&PointCloud::new(points.to_vec()), path)
            .unwrap();
    }

    fn view_points(angle_deg: u32) -> Vec<Point> {
        let offset = f64::from(angle_deg) / 100.0;
        vec![
            Point::new(10.0 + offset, 0.0, 850.0),
            Point::new(0.0, 5.0, 2000.0),
            Point::new(-4.0, 1.0 + offset, 860.0),
        ]
    }

    fn stage() -> StageGeometry {
        StageGeometry::new([0.0, 0.0, 850.0], [0.0, 1.0, 0.0]).unwrap()
    }

    fn pipeline<R: Reconstructor>(dir: &Path, reconstructor: R) -> MergePipeline<R> {
        let layout = ScanLayout::new(dir.join("scan"), dir.join("media"));
        MergePipeline::new(layout, stage(), FilterCriteria::default(), reconstructor)
    }

    #[test]
    fn missing_partials_are_materialized() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), FakeReconstructor::default());

        let output = pipeline.run().unwrap();
        assert_eq!(pipeline.reconstructor.calls.load(Ordering::SeqCst), 12);
        assert!(output
            .report
            .views
            .iter()
            .all(|v| v.source == ViewSource::Materialized));
        assert_eq!(output.report.total_points, 24);

        let model = read_ply(dir.path().join("media").join("full_model.ply")).unwrap();
        assert_eq!(model.cloud.len(), 24);
        assert_eq!(model.header.layout, Layout::BinaryLittleEndian);
    }

    #[test]
    fn existing_partials_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScanLayout::new(dir.path().join("scan"), dir.path().join("media"));
        fs::create_dir_all(layout.results_dir()).unwrap();
        for angle in ScanLayout::view_angles() {
            write_partial(&layout.partial_path(angle), &view_points(angle));
        }

        let pipeline = pipeline(dir.path(), FakeReconstructor::default());
        let output = pipeline.run().unwrap();

        assert_eq!(pipeline.reconstructor.calls.load(Ordering::SeqCst), 0);
        assert!(output
            .report
            .views
            .iter()
            .all(|v| v.source == ViewSource::Reused));
    }

    #[test]
    fn views_are_merged_in_angle_order() {
        let dir = tempfile::tempdir().unwrap();
        let output = pipeline(dir.path(), FakeReconstructor::default())
            .with_jobs(4)
            .run()
            .unwrap();

        let angles: Vec<u32> = output.report.views.iter().map(|v| v.angle_deg).collect();
        assert_eq!(angles, ScanLayout::view_angles().collect::<Vec<_>>());

        // The first surviving point of view 0 is untouched by a zero rotation.
        let first = output.cloud.points[0];
        assert!((first.x - 10.0).abs() < 1e-9);
        assert!((first.z - 850.0).abs() < 1e-9);

        // View 180 rotates (10 + 1.8, 0, 850) half a turn about the pivot.
        let view_180 = output.cloud.points[12];
        assert!((view_180.x + 11.8).abs() < 1e-9);
        assert!((view_180.z - 850.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_runs_produce_identical_models() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("media").join("full_model.ply");

        pipeline(dir.path(), FakeReconstructor::default())
            .with_jobs(1)
            .run()
            .unwrap();
        let first = fs::read(&model).unwrap();

        pipeline(dir.path(), FakeReconstructor::default())
            .with_jobs(8)
            .run()
            .unwrap();
        let second = fs::read(&model).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn fully_filtered_view_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScanLayout::new(dir.path().join("scan"), dir.path().join("media"));
        fs::create_dir_all(layout.results_dir()).unwrap();
        write_partial(
            &layout.partial_path(90),
            &[Point::new(0.0, 0.0, 100.0), Point::new(f64::NAN, 0.0, 850.0)],
        );

        let output = pipeline(dir.path(), FakeReconstructor::default())
            .run()
            .unwrap();
        let view = &output.report.views[3];

        assert_eq!(view.angle_deg, 90);
        assert_eq!(view.source, ViewSource::Reused);
        assert_eq!(view.loaded, 2);
        assert_eq!(view.merged, 0);
        assert_eq!(view.bounding_volume, None);
        assert_eq!(output.report.total_points, 22);
    }

    #[test]
    fn failing_view_aborts_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let reconstructor = FakeReconstructor {
            fail_at: Some(90),
            ..Default::default()
        };

        let err = pipeline(dir.path(), reconstructor).run().unwrap_err();
        match err {
            MergeError::View { angle_deg, source } => {
                assert_eq!(angle_deg, 90);
                assert!(matches!(source, ViewError::Reconstruction(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("media").join("full_model.ply").exists());
    }

    #[test]
    fn sequential_run_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let reconstructor = FakeReconstructor {
            fail_at: Some(0),
            ..Default::default()
        };
        let pipeline = pipeline(dir.path(), reconstructor).with_jobs(1);

        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, MergeError::View { angle_deg: 0, .. }));
        assert_eq!(pipeline.reconstructor.calls.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("media").join("partial_30.ply").exists());
    }

    #[test]
    fn malformed_partial_names_the_view() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScanLayout::new(dir.path().join("scan"), dir.path().join("media"));
        fs::create_dir_all(layout.results_dir()).unwrap();
        fs::write(layout.partial_path(300), "not a ply\n").unwrap();

        let err = pipeline(dir.path(), FakeReconstructor::default())
            .run()
            .unwrap_err();
        assert!(matches!(
            err,
            MergeError::View {
                angle_deg: 300,
                source: ViewError::Parse(_)
            }
        ));
    }

    #[test]
    fn all_empty_views_replace_model_with_empty_one() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScanLayout::new(dir.path().join("scan"), dir.path().join("media"));
        pipeline(dir.path(), FakeReconstructor::default())
            .run()
            .unwrap();
        assert_eq!(read_ply(layout.model_path()).unwrap().cloud.len(), 24);

        for angle in ScanLayout::view_angles() {
            write_partial(&layout.partial_path(angle), &[Point::new(0.0, 0.0, 5000.0)]);
        }
        let output = pipeline(dir.path(), FakeReconstructor::default())
            .run()
            .unwrap();

        assert_eq!(output.report.total_points, 0);
        assert_eq!(output.report.model_path, layout.model_path());
        let model = read_ply(layout.model_path()).unwrap();
        assert_eq!(model.header.vertex_count, 0);
        assert!(model.cloud.is_empty());
    }
}
