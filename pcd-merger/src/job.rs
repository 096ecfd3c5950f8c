use std::path::{Path, PathBuf};

use serde::Serialize;

/// Turntable positions captured per scan, one every `VIEW_STEP_DEG` degrees.
pub const VIEW_COUNT: u32 = 12;
pub const VIEW_STEP_DEG: u32 = 30;

pub const MODEL_FILE_NAME: &str = "full_model.ply";

/// One turntable position: where its images live and where its partial cloud goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewJob {
    pub angle_deg: u32,
    pub image_dir: PathBuf,
    pub partial_path: PathBuf,
}

/// On-disk conventions of a scan session:
/// `<base>/position_<deg>/gray` in, `<results>/partial_<deg>.ply` out.
#[derive(Debug, Clone)]
pub struct ScanLayout {
    pub base_dir: PathBuf,
    pub results_dir: PathBuf,
}

impl ScanLayout {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(base_dir: P, results_dir: Q) -> Self {
        Self {
            base_dir: base_dir.into(),
            results_dir: results_dir.into(),
        }
    }

    pub fn view_angles() -> impl Iterator<Item = u32> {
        (0..VIEW_COUNT).map(|i| i * VIEW_STEP_DEG)
    }

    pub fn image_dir(&self, angle_deg: u32) -> PathBuf {
        self.base_dir
            .join(format!("position_{angle_deg}"))
            .join("gray")
    }

    pub fn partial_path(&self, angle_deg: u32) -> PathBuf {
        self.results_dir.join(format!("partial_{angle_deg}.ply"))
    }

    pub fn model_path(&self) -> PathBuf {
        self.results_dir.join(MODEL_FILE_NAME)
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn jobs(&self) -> Vec<ViewJob> {
        Self::view_angles()
            .map(|angle_deg| ViewJob {
                angle_deg,
                image_dir: self.image_dir(angle_deg),
                partial_path: self.partial_path(angle_deg),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twelve_views_every_thirty_degrees() {
        let angles: Vec<u32> = ScanLayout::view_angles().collect();
        assert_eq!(angles.len(), 12);
        assert_eq!(angles.first(), Some(&0));
        assert_eq!(angles.last(), Some(&330));
        assert!(angles.windows(2).all(|w| w[1] - w[0] == 30));
    }

    #[test]
    fn jobs_follow_directory_conventions() {
        let layout = ScanLayout::new("../data/avocado_30_deg", "media");
        let jobs = layout.jobs();

        assert_eq!(jobs.len(), 12);
        assert_eq!(
            jobs[3],
            ViewJob {
                angle_deg: 90,
                image_dir: PathBuf::from("../data/avocado_30_deg/position_90/gray"),
                partial_path: PathBuf::from("media/partial_90.ply"),
            }
        );
        assert_eq!(layout.model_path(), PathBuf::from("media/full_model.ply"));
    }
}
