use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
};

use glob::glob;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use serde::Serialize;

use pcd_core::pointcloud::point::{BoundingVolume, PointCloud};
use pcd_parser::{parsers::ply::read_ply, ParseError};

use crate::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct FileStats {
    pub path: PathBuf,
    pub layout: String,
    pub points: usize,
    pub skipped_lines: usize,
    pub non_finite: usize,
    pub bounding_volume: Option<BoundingVolume>,
    pub in_z_range: Option<ZRangeStats>,
}

/// Finite points with `z_min <= z <= z_max` and where they sit.
#[derive(Debug, Clone, Serialize)]
pub struct ZRangeStats {
    pub count: usize,
    pub bounding_volume: Option<BoundingVolume>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub files: Vec<FileStats>,
    pub total_points: usize,
    pub bounding_volume: Option<BoundingVolume>,
    pub z_range: Option<[f64; 2]>,
    pub in_z_range: Option<ZRangeStats>,
}

pub fn expand_globs(input_patterns: &[String]) -> Result<Vec<PathBuf>, AppError> {
    let mut paths = Vec::new();
    for pattern in input_patterns {
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            for entry in glob(pattern)? {
                match entry {
                    Ok(path) => paths.push(path),
                    Err(e) => log::warn!("skipping unreadable path: {}", e),
                }
            }
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }

    if paths.is_empty() {
        return Err(AppError::NoInput(input_patterns.to_vec()));
    }
    Ok(paths)
}

pub fn inspect(paths: &[PathBuf], z_range: Option<[f64; 2]>) -> Result<InspectReport, ParseError> {
    let files = paths
        .par_iter()
        .map(|path| file_stats(path, z_range))
        .collect::<Result<Vec<_>, _>>()?;

    let in_z_range = z_range.map(|_| {
        let ranges: Vec<&ZRangeStats> = files
            .iter()
            .filter_map(|f| f.in_z_range.as_ref())
            .collect();
        ZRangeStats {
            count: ranges.iter().map(|r| r.count).sum(),
            bounding_volume: union(ranges.iter().map(|r| &r.bounding_volume)),
        }
    });

    Ok(InspectReport {
        total_points: files.iter().map(|f| f.points).sum(),
        bounding_volume: union(files.iter().map(|f| &f.bounding_volume)),
        z_range,
        in_z_range,
        files,
    })
}

fn union<'a, I>(volumes: I) -> Option<BoundingVolume>
where
    I: IntoIterator<Item = &'a Option<BoundingVolume>>,
{
    let mut volume = BoundingVolume::empty();
    for part in volumes.into_iter().flatten() {
        volume.extend(&part.min.into());
        volume.extend(&part.max.into());
    }
    (!volume.is_empty()).then_some(volume)
}

fn file_stats(path: &Path, z_range: Option<[f64; 2]>) -> Result<FileStats, ParseError> {
    let parsed = read_ply(path)?;
    let cloud: &PointCloud = &parsed.cloud;
    let volume = cloud.metadata.bounding_volume;

    Ok(FileStats {
        path: path.to_path_buf(),
        layout: parsed.header.layout.to_string(),
        points: cloud.len(),
        skipped_lines: parsed.skipped_lines,
        non_finite: cloud.points.iter().filter(|p| !p.is_finite()).count(),
        bounding_volume: (!volume.is_empty()).then_some(volume),
        in_z_range: z_range.map(|[z_min, z_max]| {
            let mut count = 0;
            let mut volume = BoundingVolume::empty();
            for point in cloud
                .points
                .iter()
                .filter(|p| p.is_finite() && p.z >= z_min && p.z <= z_max)
            {
                count += 1;
                volume.extend(point);
            }
            ZRangeStats {
                count,
                bounding_volume: (!volume.is_empty()).then_some(volume),
            }
        }),
    })
}

pub fn render_text(report: &InspectReport) -> String {
    let mut out = String::new();
    for file in &report.files {
        let _ = writeln!(
            out,
            "{}: {} points ({}, {} skipped lines, {} non-finite)",
            file.path.display(),
            file.points,
            file.layout,
            file.skipped_lines,
            file.non_finite
        );
        if let Some(volume) = &file.bounding_volume {
            write_bounds(&mut out, "  ", volume);
        }
    }

    let _ = writeln!(out, "total points: {}", report.total_points);
    if let Some(volume) = &report.bounding_volume {
        write_bounds(&mut out, "", volume);
    }
    if let (Some([z_min, z_max]), Some(inside)) = (report.z_range, &report.in_z_range) {
        let _ = writeln!(out, "points with z in [{z_min}, {z_max}]: {}", inside.count);
        if let Some(volume) = &inside.bounding_volume {
            write_bounds(&mut out, "  ", volume);
        }
    }
    out
}

fn write_bounds(out: &mut String, indent: &str, volume: &BoundingVolume) {
    let _ = writeln!(out, "{indent}min: {:?}", volume.min);
    let _ = writeln!(out, "{indent}max: {:?}", volume.max);
    let _ = writeln!(
        out,
        "{indent}z range: {} .. {}",
        volume.min[2], volume.max[2]
    );
}
