use std::io::BufRead;

use pcd_core::format::Layout;

use crate::error::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(ScalarType::Char),
            "uchar" | "uint8" => Some(ScalarType::UChar),
            "short" | "int16" => Some(ScalarType::Short),
            "ushort" | "uint16" => Some(ScalarType::UShort),
            "int" | "int32" => Some(ScalarType::Int),
            "uint" | "uint32" => Some(ScalarType::UInt),
            "float" | "float32" => Some(ScalarType::Float),
            "double" | "float64" => Some(ScalarType::Double),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            ScalarType::Char | ScalarType::UChar => 1,
            ScalarType::Short | ScalarType::UShort => 2,
            ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
            ScalarType::Double => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub scalar: ScalarType,
}

/// Where a coordinate lives inside one vertex record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    pub index: usize,
    pub byte_offset: usize,
    pub scalar: ScalarType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlyHeader {
    pub layout: Layout,
    pub vertex_count: usize,
    pub properties: Vec<PropertyDef>,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Vertex,
    Other,
}

impl PlyHeader {
    /// Consumes the header, leaving `reader` positioned at the first body byte.
    pub fn read<R: BufRead>(reader: &mut R) -> Result<Self, ParseError> {
        let mut buf = Vec::new();

        if read_header_line(reader, &mut buf)?.as_deref() != Some("ply") {
            return Err(ParseError::format("missing 'ply' magic line"));
        }

        let mut layout = None;
        let mut vertex_count = None;
        let mut properties = Vec::new();
        let mut comments = Vec::new();
        let mut section = Section::None;

        loop {
            let line = match read_header_line(reader, &mut buf)? {
                Some(line) => line,
                None => {
                    return Err(ParseError::format(
                        "reached end of input before 'end_header'",
                    ))
                }
            };

            let mut tokens = line.split_whitespace();
            match tokens.next() {
                None | Some("obj_info") => {}
                Some("end_header") => break,
                Some("comment") => {
                    let text = line.trim_start()["comment".len()..].trim();
                    comments.push(text.to_string());
                }
                Some("format") => {
                    let keyword = tokens
                        .next()
                        .ok_or_else(|| ParseError::format("'format' line without layout"))?;
                    layout = Some(Layout::from_header_keyword(keyword).ok_or_else(|| {
                        ParseError::format(format!("unsupported layout '{keyword}'"))
                    })?);
                }
                Some("element") => {
                    let name = tokens.next().unwrap_or_default();
                    if name == "vertex" {
                        if section == Section::Other {
                            return Err(ParseError::format(
                                "the vertex element must be declared before other elements",
                            ));
                        }
                        let count = tokens
                            .next()
                            .and_then(|c| c.parse::<usize>().ok())
                            .ok_or_else(|| {
                                ParseError::format(format!("invalid vertex count in '{line}'"))
                            })?;
                        vertex_count = Some(count);
                        section = Section::Vertex;
                    } else {
                        section = Section::Other;
                    }
                }
                Some("property") => {
                    if section != Section::Vertex {
                        continue;
                    }
                    let type_name = tokens.next().unwrap_or_default();
                    if type_name == "list" {
                        return Err(ParseError::format(
                            "list properties on the vertex element are not supported",
                        ));
                    }
                    let scalar = ScalarType::from_name(type_name).ok_or_else(|| {
                        ParseError::format(format!("unknown property type '{type_name}'"))
                    })?;
                    let name = tokens
                        .next()
                        .ok_or_else(|| ParseError::format("property without a name"))?;
                    properties.push(PropertyDef {
                        name: name.to_string(),
                        scalar,
                    });
                }
                Some(other) => {
                    log::warn!("ignoring unknown PLY header keyword '{}'", other);
                }
            }
        }

        let layout = layout.ok_or_else(|| ParseError::format("missing 'format' line"))?;
        let vertex_count = vertex_count
            .ok_or_else(|| ParseError::format("missing 'element vertex <count>' declaration"))?;

        Ok(PlyHeader {
            layout,
            vertex_count,
            properties,
            comments,
        })
    }

    /// Slots for x, y and z. Files that declare no vertex properties at all are
    /// read positionally.
    pub fn position_slots(&self) -> Result<[FieldSlot; 3], ParseError> {
        if self.properties.is_empty() {
            return Ok([0, 1, 2].map(|index| FieldSlot {
                index,
                byte_offset: index * ScalarType::Float.size(),
                scalar: ScalarType::Float,
            }));
        }

        let mut slots = [None; 3];
        let mut byte_offset = 0;
        for (index, property) in self.properties.iter().enumerate() {
            let axis = match property.name.as_str() {
                "x" => Some(0),
                "y" => Some(1),
                "z" => Some(2),
                _ => None,
            };
            if let Some(axis) = axis {
                slots[axis] = Some(FieldSlot {
                    index,
                    byte_offset,
                    scalar: property.scalar,
                });
            }
            byte_offset += property.scalar.size();
        }

        match slots {
            [Some(x), Some(y), Some(z)] => Ok([x, y, z]),
            _ => Err(ParseError::format(
                "vertex element must declare x, y and z properties",
            )),
        }
    }

    pub fn record_stride(&self) -> usize {
        if self.properties.is_empty() {
            return 3 * ScalarType::Float.size();
        }
        self.properties.iter().map(|p| p.scalar.size()).sum()
    }
}

fn read_header_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, ParseError> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}
