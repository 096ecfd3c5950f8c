use std::{borrow::Cow, collections::BTreeMap, io::Write as _, path::Path};

use byteorder::{ByteOrder as _, LittleEndian};
use gltf::{
    binary::{Glb, Header},
    json::{
        accessor::{ComponentType, GenericComponentType, Type},
        buffer::{Stride, Target, View},
        mesh::{Mode, Primitive, Semantic},
        validation::{Checked::Valid, USize64},
        Accessor, Asset, Buffer, Mesh, Node, Root, Scene,
    },
};

use pcd_core::pointcloud::{
    decimation::decimator::RandomDecimator,
    point::{Point, PointCloud},
};

use crate::{atomic::write_atomically, error::ExportError};

const BYTE_STRIDE: usize = (4 * 3) + (3 + 1);

// Viridis, sampled at five evenly spaced stops.
const HEIGHT_COLORMAP: [[f64; 3]; 5] = [
    [0.267, 0.005, 0.329],
    [0.229, 0.322, 0.546],
    [0.128, 0.567, 0.551],
    [0.369, 0.789, 0.383],
    [0.993, 0.906, 0.144],
];

/// Destination for a human-viewable rendering of a cloud.
pub trait PreviewSink {
    /// Returns the number of points actually rendered.
    fn render(&self, cloud: &PointCloud, path: &Path, title: &str) -> Result<usize, ExportError>;
}

/// Renders a random subset of the cloud as a glTF binary point primitive,
/// colored by height.
#[derive(Debug, Clone, Copy)]
pub struct GlbPreview {
    pub target_count: usize,
    pub seed: Option<u64>,
}

impl GlbPreview {
    pub const DEFAULT_TARGET_COUNT: usize = 100_000;
}

impl Default for GlbPreview {
    fn default() -> Self {
        Self {
            target_count: Self::DEFAULT_TARGET_COUNT,
            seed: None,
        }
    }
}

impl PreviewSink for GlbPreview {
    fn render(&self, cloud: &PointCloud, path: &Path, title: &str) -> Result<usize, ExportError> {
        let decimator = RandomDecimator {
            target_count: self.target_count,
            seed: self.seed,
        };
        let sampled = decimator.sample(cloud);
        if sampled.len() < cloud.len() {
            log::info!(
                "subsampled {} of {} points for preview",
                sampled.len(),
                cloud.len()
            );
        }

        let glb = generate_glb(&sampled, title)?.to_vec()?;
        write_atomically(path, |writer| {
            writer.write_all(&glb)?;
            Ok(())
        })?;

        Ok(sampled.len())
    }
}

pub fn generate_glb<'a>(points: &PointCloud, title: &str) -> Result<Glb<'a>, ExportError> {
    let finite: Vec<&Point> = points.points.iter().filter(|p| p.is_finite()).collect();

    let volume = points.metadata.bounding_volume;
    let offset = if volume.is_empty() {
        [0.0; 3]
    } else {
        volume.min
    };

    let mut bin_content: Vec<u8> = Vec::with_capacity(finite.len() * BYTE_STRIDE);
    let mut buffer = [0u8; BYTE_STRIDE];
    let mut min = [f64::MAX; 3];
    let mut max = [f64::MIN; 3];

    for point in &finite {
        let local = [
            (point.x - offset[0]) as f32,
            (point.y - offset[1]) as f32,
            (point.z - offset[2]) as f32,
        ];
        LittleEndian::write_f32_into(&local, &mut buffer[0..12]);

        for axis in 0..3 {
            min[axis] = min[axis].min(local[axis] as f64);
            max[axis] = max[axis].max(local[axis] as f64);
        }

        let rgb = height_color(point.z, volume.min[2], volume.max[2]);
        buffer[12..15].copy_from_slice(&rgb);
        buffer[15] = 0;

        bin_content.extend_from_slice(&buffer);
    }

    let mut root = Root {
        asset: Asset {
            generator: Some(concat!("scanmerge ", env!("CARGO_PKG_VERSION")).to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let node = if finite.is_empty() {
        root.push(Node {
            name: Some(title.to_string()),
            ..Default::default()
        })
    } else {
        let mesh = push_point_mesh(&mut root, bin_content.len(), finite.len(), min, max);
        root.push(Node {
            name: Some(title.to_string()),
            mesh: Some(mesh),
            translation: Some(offset.map(|v| v as f32)),
            ..Default::default()
        })
    };

    let scene = root.push(Scene {
        extensions: Default::default(),
        extras: Default::default(),
        name: Some(title.to_string()),
        nodes: vec![node],
    });
    root.scene = Some(scene);

    let json = serde_json::to_vec(&root)?;
    let bin = (!bin_content.is_empty()).then_some(bin_content);
    Ok(Glb {
        header: Header {
            magic: *b"glTF",
            version: 2,
            length: glb_length(json.len(), bin.as_ref().map(Vec::len))?,
        },
        json: Cow::Owned(json),
        bin: bin.map(Cow::Owned),
    })
}

/// One interleaved buffer view holding f32 positions followed by normalized
/// u8 colors, drawn as a point primitive.
fn push_point_mesh(
    root: &mut Root,
    byte_length: usize,
    count: usize,
    min: [f64; 3],
    max: [f64; 3],
) -> gltf::json::Index<Mesh> {
    let buffer = root.push(Buffer {
        byte_length: USize64::from(byte_length),
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        uri: None,
    });
    let view = root.push(View {
        buffer,
        byte_length: USize64::from(byte_length),
        byte_offset: None,
        byte_stride: Some(Stride(BYTE_STRIDE)),
        extensions: Default::default(),
        extras: Default::default(),
        name: Some("vertices".to_string()),
        target: Some(Valid(Target::ArrayBuffer)),
    });

    let positions = root.push(Accessor {
        buffer_view: Some(view),
        byte_offset: None,
        count: USize64::from(count),
        component_type: Valid(GenericComponentType(ComponentType::F32)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(Type::Vec3),
        min: Some(serde_json::Value::from(min.to_vec())),
        max: Some(serde_json::Value::from(max.to_vec())),
        name: Some("positions".to_string()),
        normalized: false,
        sparse: None,
    });
    let colors = root.push(Accessor {
        buffer_view: Some(view),
        byte_offset: Some(USize64::from(4 * 3_usize)),
        count: USize64::from(count),
        component_type: Valid(GenericComponentType(ComponentType::U8)),
        extensions: Default::default(),
        extras: Default::default(),
        type_: Valid(Type::Vec3),
        min: None,
        max: None,
        name: Some("colors".to_string()),
        normalized: true,
        sparse: None,
    });

    let attributes = BTreeMap::from([
        (Valid(Semantic::Positions), positions),
        (Valid(Semantic::Colors(0)), colors),
    ]);
    root.push(Mesh {
        extensions: Default::default(),
        extras: Default::default(),
        name: None,
        primitives: vec![Primitive {
            attributes,
            extensions: Default::default(),
            extras: Default::default(),
            indices: None,
            material: None,
            mode: Valid(Mode::Points),
            targets: None,
        }],
        weights: None,
    })
}

// Header, chunk headers and both chunks padded to four bytes.
fn glb_length(json_len: usize, bin_len: Option<usize>) -> Result<u32, ExportError> {
    let padded = |len: usize| len.div_ceil(4) * 4;
    let total = 12 + 8 + padded(json_len) + bin_len.map_or(0, |len| 8 + padded(len));
    u32::try_from(total).map_err(|_| ExportError::TooLarge(total))
}

fn height_color(z: f64, z_min: f64, z_max: f64) -> [u8; 3] {
    let range = z_max - z_min;
    let t = if range > 0.0 {
        ((z - z_min) / range).clamp(0.0, 1.0)
    } else {
        0.5
    };

    let scaled = t * (HEIGHT_COLORMAP.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(HEIGHT_COLORMAP.len() - 2);
    let frac = scaled - lower as f64;

    let a = HEIGHT_COLORMAP[lower];
    let b = HEIGHT_COLORMAP[lower + 1];
    [0, 1, 2].map(|i| ((a[i] + (b[i] - a[i]) * frac) * 255.0).round().clamp(0.0, 255.0) as u8)
}
