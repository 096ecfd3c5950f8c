use std::{io::Write, path::Path};

use byteorder::{ByteOrder as _, LittleEndian};

use pcd_core::{format::Layout, pointcloud::point::PointCloud};

use crate::{atomic::write_atomically, error::ExportError};

const RECORD_SIZE: usize = 4 * 3;

/// Writes `x y z` float vertices. Every record is derived from the same slice
/// the header count is taken from, so the two cannot disagree.
#[derive(Debug, Clone, Default)]
pub struct PlyExporter {
    pub layout: Layout,
    pub comments: Vec<String>,
}

impl PlyExporter {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            comments: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn write<P: AsRef<Path>>(&self, cloud: &PointCloud, path: P) -> Result<(), ExportError> {
        let path = path.as_ref();
        let start = std::time::Instant::now();

        write_atomically(path, |writer| self.write_to(cloud, writer))?;

        log::debug!(
            "wrote {} points to {:?} ({}) in {:?}",
            cloud.len(),
            path,
            self.layout,
            start.elapsed()
        );
        Ok(())
    }

    pub fn write_to<W: Write + ?Sized>(
        &self,
        cloud: &PointCloud,
        writer: &mut W,
    ) -> Result<(), ExportError> {
        self.write_header(cloud.len(), writer)?;

        match self.layout {
            Layout::Ascii => {
                for (x, y, z, _) in cloud.iter() {
                    writeln!(writer, "{} {} {}", x as f32, y as f32, z as f32)?;
                }
            }
            Layout::BinaryLittleEndian => {
                let mut buffer = [0u8; RECORD_SIZE];
                for point in &cloud.points {
                    LittleEndian::write_f32_into(&point.to_f32_array(), &mut buffer);
                    writer.write_all(&buffer)?;
                }
            }
        }

        Ok(())
    }

    fn write_header<W: Write + ?Sized>(
        &self,
        count: usize,
        writer: &mut W,
    ) -> Result<(), ExportError> {
        writeln!(writer, "ply")?;
        writeln!(writer, "format {} 1.0", self.layout.header_keyword())?;
        for comment in &self.comments {
            writeln!(writer, "comment {}", comment.replace(['\r', '\n'], " "))?;
        }
        writeln!(writer, "element vertex {}", count)?;
        writeln!(writer, "property float x")?;
        writeln!(writer, "property float y")?;
        writeln!(writer, "property float z")?;
        writeln!(writer, "end_header")?;
        Ok(())
    }
}
