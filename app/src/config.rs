use std::{fs, path::Path};

use serde::Deserialize;

use pcd_core::geometry::StageGeometry;

use crate::error::AppError;

/// Turntable calibration as written by the stage calibration step.
/// Keys other than `p` and `dir` are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageCalibration {
    pub p: [f64; 3],
    pub dir: [f64; 3],
}

impl StageCalibration {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AppError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| AppError::Calibration {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn geometry(&self) -> Result<StageGeometry, AppError> {
        Ok(StageGeometry::new(self.p, self.dir)?)
    }
}

#[cfg(test)]
mod tests {
    use pcd_core::error::ConfigError;

    use super::*;

    fn write(dir: &Path, text: &str) -> std::path::PathBuf {
        let path = dir.join("stage_geometry.json");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn extra_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            r#"{"p": [-10.5178, -40.0557, 858.6701], "dir": [0.0, 2.0, 0.0], "rms": 0.12}"#,
        );

        let calibration = StageCalibration::load(&path).unwrap();
        assert_eq!(calibration.p, [-10.5178, -40.0557, 858.6701]);

        let stage = calibration.geometry().unwrap();
        assert_eq!(stage.axis(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn missing_key_is_a_calibration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), r#"{"p": [0, 0, 0]}"#);

        let err = StageCalibration::load(&path).unwrap_err();
        assert!(matches!(err, AppError::Calibration { .. }));
    }

    #[test]
    fn zero_axis_is_rejected() {
        let calibration = StageCalibration {
            p: [0.0, 0.0, 850.0],
            dir: [0.0, 0.0, 0.0],
        };
        let err = calibration.geometry().unwrap_err();
        assert!(matches!(
            err,
            AppError::Config(ConfigError::DegenerateAxis(_))
        ));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = StageCalibration::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, AppError::Read { .. }));
    }
}
