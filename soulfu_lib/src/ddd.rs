use bilge::prelude::*;
use binrw::{BinRead, BinWrite, binrw};

/// World units per raw coordinate unit are `scale / 20000`.
pub const SCALE_DIVISOR: f32 = 20000.0;

/// A packed SoulFu model container.
///
/// The file is a strict sequence of variable length records with no index
/// and no stored offsets. Every record's extent comes from count fields in
/// its own prefix, except bone frames, which take their bone and joint
/// counts from the base model they reference by id.
#[binrw]
#[derive(Debug, PartialEq, Clone)]
#[bw(assert(flags.external_bone_frames() == external_bone_frame_file.is_some(),
    "external bone frame file must match the header flag"))]
pub struct Ddd {
    pub scale: u16,
    pub flags: DddFlags,
    pub unk: u8,

    #[br(temp)]
    #[bw(calc = base_models.len() as u8)]
    base_model_count: u8,

    /// Counts internal frames only. Files with external bone frames keep
    /// the frame count in the external file itself.
    #[br(temp)]
    #[bw(calc = bone_frames.len() as u16)]
    bone_frame_count: u16,

    pub shadow_texture_indices: [u8; 4],

    /// 8 byte name of the file holding the bone frames when
    /// [external_bone_frames](DddFlags::external_bone_frames) is set.
    #[br(if(flags.external_bone_frames()))]
    pub external_bone_frame_file: Option<[u8; 8]>,

    #[br(count = base_model_count)]
    pub base_models: Vec<BaseModel>,

    #[br(temp, calc = base_models.iter().map(SkeletonCounts::from).collect::<Vec<_>>())]
    #[bw(ignore)]
    skeletons: Vec<SkeletonCounts>,

    #[br(if(!flags.external_bone_frames()))]
    #[br(args { count: bone_frame_count as usize, inner: skeletons.clone() })]
    pub bone_frames: Vec<BoneFrame>,
}

impl Ddd {
    pub fn external_bone_frame_file_name(&self) -> Option<String> {
        self.external_bone_frame_file.map(|name| {
            String::from_utf8_lossy(&name)
                .trim_end_matches(['\0', ' '])
                .to_string()
        })
    }
}

#[bitsize(16)]
#[derive(DebugBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = |x: u16| x.into())]
#[bw(map = |&x| u16::from(x))]
pub struct DddFlags {
    pub unk: u14,
    /// Bone frames live in a separate file named after the header.
    pub external_bone_frames: bool,
    pub unk2: bool,
}

/// One mesh's static geometry. Always carries exactly 4 texture slots,
/// active or not, so an empty base model is exactly 12 bytes.
#[binrw]
#[derive(Debug, PartialEq, Clone)]
pub struct BaseModel {
    #[br(temp)]
    #[bw(calc = vertices.len() as u16)]
    vertex_count: u16,

    #[br(temp)]
    #[bw(calc = texture_vertices.len() as u16)]
    texture_vertex_count: u16,

    #[br(temp)]
    #[bw(calc = joints.len() as u16)]
    joint_count: u16,

    #[br(temp)]
    #[bw(calc = bones.len() as u16)]
    bone_count: u16,

    #[br(count = vertex_count)]
    pub vertices: Vec<Vertex>,

    #[br(count = texture_vertex_count)]
    pub texture_vertices: Vec<TextureVertex>,

    pub textures: [Texture; 4],

    #[br(count = joint_count)]
    pub joints: Vec<Joint>,

    #[br(count = bone_count)]
    pub bones: Vec<Bone>,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct Vertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub bone_id: u8,
    pub unk: u8,
    pub weight: VertexWeight,
}

impl Vertex {
    /// The skinning weight out of 255 recovered from the packed 7 bits.
    pub fn bone_weight(&self) -> u8 {
        self.weight.weight().value() << 1
    }

    pub fn anchored(&self) -> bool {
        self.weight.anchored()
    }
}

#[bitsize(8)]
#[derive(DebugBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = |x: u8| x.into())]
#[bw(map = |&x| u8::from(x))]
pub struct VertexWeight {
    /// Weight over 255, stored shifted right by 1.
    pub weight: u7,
    pub anchored: bool,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct TextureVertex {
    pub u: i16,
    pub v: i16,
}

/// One of the 4 fixed texture slots of a base model.
///
/// A slot with rendering mode 0 is unused, occupies a single byte and
/// contributes no triangles.
#[derive(Debug, BinRead, BinWrite, PartialEq, Clone)]
#[bw(assert((*rendering_mode == 0) == data.is_none(), "texture slot data must match its rendering mode"))]
pub struct Texture {
    pub rendering_mode: u8,

    #[br(if(rendering_mode != 0))]
    pub data: Option<TextureData>,
}

impl Texture {
    pub fn disabled() -> Self {
        Self {
            rendering_mode: 0,
            data: None,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.data.as_ref().map(|d| d.triangles.len()).unwrap_or(0)
    }
}

#[binrw]
#[derive(Debug, PartialEq, Clone)]
pub struct TextureData {
    pub flags: TextureFlags,
    pub alpha: u8,

    #[br(temp)]
    #[bw(calc = triangles.len() as u16)]
    triangle_count: u16,

    #[br(count = triangle_count)]
    pub triangles: Vec<Triangle>,
}

#[bitsize(8)]
#[derive(DebugBits, FromBits, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[br(map = |x: u8| x.into())]
#[bw(map = |&x| u8::from(x))]
pub struct TextureFlags {
    pub light: bool,
    pub color: bool,
    pub nocull: bool,
    pub enviro: bool,
    pub cartoon: bool,
    pub eye: bool,
    pub noline: bool,
    pub paper: bool,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct Triangle {
    pub vertices: [TriangleVertex; 3],
}

/// Indices are 0 based in the container and 1 based in OBJ text.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct TriangleVertex {
    pub vertex_index: u16,
    pub texture_vertex_index: u16,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct Joint {
    pub collision_size: u8,
}

/// A directed link between two joints.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct Bone {
    pub id: u8,
    pub joint_a: u16,
    pub joint_b: u16,
}

/// Bone and joint counts of an already parsed base model, needed to size
/// the bone frames that reference it.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct SkeletonCounts {
    pub bones: usize,
    pub joints: usize,
}

impl From<&BaseModel> for SkeletonCounts {
    fn from(base_model: &BaseModel) -> Self {
        Self {
            bones: base_model.bones.len(),
            joints: base_model.joints.len(),
        }
    }
}

/// One posed instance of a base model.
///
/// The record is self describing only relative to the base model table:
/// its bone normal and joint position counts come from the base model
/// named by [base_model_id](Self::base_model_id).
#[binrw]
#[derive(Debug, PartialEq, Clone)]
#[br(import_raw(skeletons: Vec<SkeletonCounts>))]
pub struct BoneFrame {
    pub action: u8,
    pub action_modifier: u8,

    #[br(assert((base_model_id as usize) < skeletons.len(),
        "bone frame references base model {} of {}", base_model_id, skeletons.len()))]
    pub base_model_id: u8,

    pub offset_x: i16,
    pub offset_y: i16,

    #[br(temp, calc = skeletons[base_model_id as usize])]
    #[bw(ignore)]
    counts: SkeletonCounts,

    #[br(count = counts.bones)]
    pub bone_normals: Vec<BoneNormal>,

    #[br(count = counts.joints)]
    pub joint_positions: Vec<JointPosition>,

    pub shadow_textures: [ShadowTexture; 4],
}

/// Raw per frame bone direction. Normalization happens on export.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct BoneNormal {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct JointPosition {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// A screen space blob shadow quad. Inactive entries (alpha 0) occupy a
/// single byte, active ones 17 bytes.
#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
#[bw(assert((*alpha == 0) == quad.is_none(), "shadow texture quad must match its alpha"))]
pub struct ShadowTexture {
    pub alpha: u8,

    #[br(if(alpha != 0))]
    pub quad: Option<[ShadowVertex; 4]>,
}

impl ShadowTexture {
    pub fn disabled() -> Self {
        Self {
            alpha: 0,
            quad: None,
        }
    }
}

#[derive(Debug, BinRead, BinWrite, PartialEq, Eq, Clone, Copy)]
pub struct ShadowVertex {
    pub u: i16,
    pub v: i16,
}
