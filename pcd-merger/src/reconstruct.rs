use std::{
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::{error::ReconstructionError, job::ViewJob};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Turns the images of one view into its partial cloud at `job.partial_path`.
pub trait Reconstructor: Sync {
    fn reconstruct(&self, job: &ViewJob) -> Result<(), ReconstructionError>;
}

/// Runs `<bin> <camera> <projector> <image_dir> <partial_path>` and blocks
/// until it exits. A zero exit status means success.
#[derive(Debug, Clone)]
pub struct ExternalReconstructor {
    pub bin: PathBuf,
    pub camera: PathBuf,
    pub projector: PathBuf,
    pub timeout: Option<Duration>,
}

impl ExternalReconstructor {
    pub fn new<P: Into<PathBuf>>(bin: P, camera: P, projector: P) -> Self {
        Self {
            bin: bin.into(),
            camera: camera.into(),
            projector: projector.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn command(&self, job: &ViewJob) -> Command {
        let mut command = Command::new(&self.bin);
        command
            .arg(&self.camera)
            .arg(&self.projector)
            .arg(&job.image_dir)
            .arg(&job.partial_path)
            .stdin(Stdio::null());
        command
    }

    fn wait(&self, mut child: Child) -> Result<(), ReconstructionError> {
        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        // The child may have exited between the poll and the kill.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(ReconstructionError::Timeout(timeout));
                    }
                    thread::sleep(POLL_INTERVAL);
                }
            }
        };

        if status.success() {
            Ok(())
        } else {
            Err(ReconstructionError::ExitStatus(status))
        }
    }
}

impl Reconstructor for ExternalReconstructor {
    fn reconstruct(&self, job: &ViewJob) -> Result<(), ReconstructionError> {
        log::info!(
            "reconstructing view {} deg: {:?} -> {:?}",
            job.angle_deg,
            job.image_dir,
            job.partial_path
        );
        let start = Instant::now();

        let child = self
            .command(job)
            .spawn()
            .map_err(|source| ReconstructionError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;
        self.wait(child)?;

        if !job.partial_path.is_file() {
            return Err(ReconstructionError::MissingOutput(job.partial_path.clone()));
        }

        log::debug!(
            "reconstructed view {} deg in {:?}",
            job.angle_deg,
            start.elapsed()
        );
        Ok(())
    }
}
