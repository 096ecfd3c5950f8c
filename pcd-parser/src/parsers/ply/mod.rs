use std::{
    fs::File,
    io::{self, BufRead, BufReader, Read},
    path::{Path, PathBuf},
};

use byteorder::{ByteOrder as _, LittleEndian};

use pcd_core::{
    format::Layout,
    pointcloud::point::{Point, PointCloud},
};

use super::{Parser, ParserProvider};
use crate::error::ParseError;

pub mod header;

use header::{FieldSlot, PlyHeader, ScalarType};

const READ_BUFFER_CAPACITY: usize = 1 << 20;
// The declared vertex count is untrusted until the body has been read.
const MAX_PREALLOCATED_POINTS: usize = 1 << 20;

/// A decoded PLY file together with what the reader had to drop.
#[derive(Debug, Clone)]
pub struct ParsedPly {
    pub header: PlyHeader,
    pub cloud: PointCloud,
    /// Body lines with too few or unparseable tokens (ascii layout only).
    pub skipped_lines: usize,
}

pub struct PlyParserProvider {
    pub filenames: Vec<PathBuf>,
}

impl ParserProvider for PlyParserProvider {
    fn get_parser(&self) -> Box<dyn Parser> {
        Box::new(PlyParser {
            filenames: self.filenames.clone(),
        })
    }
}

/// Reads every file in order and concatenates the vertices.
pub struct PlyParser {
    pub filenames: Vec<PathBuf>,
}

impl Parser for PlyParser {
    fn parse(&self) -> Result<PointCloud, ParseError> {
        let mut clouds = Vec::with_capacity(self.filenames.len());
        for filename in &self.filenames {
            let start = std::time::Instant::now();
            let parsed = read_ply(filename)?;
            log::debug!(
                "read {:?}: {} points ({} skipped lines) in {:?}",
                filename,
                parsed.cloud.len(),
                parsed.skipped_lines,
                start.elapsed()
            );
            clouds.push(parsed.cloud);
        }
        Ok(PointCloud::concat(clouds))
    }
}

pub fn read_ply<P: AsRef<Path>>(path: P) -> Result<ParsedPly, ParseError> {
    let file = File::open(path.as_ref())?;
    let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, file);
    read_ply_from(&mut reader)
}

pub fn read_ply_from<R: BufRead>(reader: &mut R) -> Result<ParsedPly, ParseError> {
    let header = PlyHeader::read(reader)?;
    let slots = header.position_slots()?;

    let (points, skipped_lines) = match header.layout {
        Layout::Ascii => read_ascii_body(reader, &header, &slots)?,
        Layout::BinaryLittleEndian => (read_binary_body(reader, &header, &slots)?, 0),
    };

    Ok(ParsedPly {
        header,
        cloud: PointCloud::new(points),
        skipped_lines,
    })
}

fn read_ascii_body<R: BufRead>(
    reader: &mut R,
    header: &PlyHeader,
    slots: &[FieldSlot; 3],
) -> Result<(Vec<Point>, usize), ParseError> {
    let min_tokens = slots
        .iter()
        .map(|slot| slot.index + 1)
        .max()
        .unwrap_or(3)
        .max(3);

    let mut points = Vec::with_capacity(preallocation(header));
    let mut skipped = 0;
    let mut line = Vec::new();

    for read in 0..header.vertex_count {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Err(ParseError::format(format!(
                "body truncated: header declares {} vertices, found {}",
                header.vertex_count, read
            )));
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            skipped += 1;
            continue;
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.len() < min_tokens {
            skipped += 1;
            continue;
        }

        let coords: Result<Vec<f64>, _> = slots
            .iter()
            .map(|slot| tokens[slot.index].parse::<f64>())
            .collect();
        match coords {
            Ok(c) => points.push(Point::new(c[0], c[1], c[2])),
            Err(_) => skipped += 1,
        }
    }

    Ok((points, skipped))
}

fn read_binary_body<R: Read>(
    reader: &mut R,
    header: &PlyHeader,
    slots: &[FieldSlot; 3],
) -> Result<Vec<Point>, ParseError> {
    let stride = header.record_stride();
    let mut record = vec![0u8; stride];
    let mut points = Vec::with_capacity(preallocation(header));

    for read in 0..header.vertex_count {
        reader.read_exact(&mut record).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                ParseError::format(format!(
                    "body truncated: header declares {} vertices, found {}",
                    header.vertex_count, read
                ))
            } else {
                ParseError::Io(e)
            }
        })?;

        let [x, y, z] =
            (*slots).map(|slot| read_scalar(&record[slot.byte_offset..], slot.scalar));
        points.push(Point::new(x, y, z));
    }

    Ok(points)
}

fn preallocation(header: &PlyHeader) -> usize {
    header.vertex_count.min(MAX_PREALLOCATED_POINTS)
}

fn read_scalar(bytes: &[u8], scalar: ScalarType) -> f64 {
    match scalar {
        ScalarType::Char => bytes[0] as i8 as f64,
        ScalarType::UChar => bytes[0] as f64,
        ScalarType::Short => LittleEndian::read_i16(bytes) as f64,
        ScalarType::UShort => LittleEndian::read_u16(bytes) as f64,
        ScalarType::Int => LittleEndian::read_i32(bytes) as f64,
        ScalarType::UInt => LittleEndian::read_u32(bytes) as f64,
        ScalarType::Float => LittleEndian::read_f32(bytes) as f64,
        ScalarType::Double => LittleEndian::read_f64(bytes),
    }
}
