//! # soulfu_model
//!
//! soulfu_model provides a more intuitive and minimal API built on [soulfu_lib]
//! for converting SoulFu DDD models to and from Wavefront OBJ text.
//!
//! [DddModel] uses standard Rust types with world space coordinates, so
//! position and texture coordinate scaling are applied once on load and
//! inverted once on save. Skeletal data stays in its raw fixed point form
//! since the OBJ side only ever renders it as comments.
use std::path::Path;

use glam::{Vec2, Vec3, vec2, vec3};
use soulfu_lib::ddd::{
    BaseModel, Bone, BoneFrame, Ddd, DddFlags, Joint, SCALE_DIVISOR, Texture, TextureData,
    TextureFlags, Triangle, Vertex, VertexWeight,
};
use thiserror::Error;

pub use soulfu_lib::ddd::{BoneNormal, JointPosition, ShadowTexture, ShadowVertex, TriangleVertex};

pub mod action;
pub mod obj;

#[derive(Debug, Error)]
pub enum DddError {
    #[error("failed to read or write model data")]
    Io(#[from] std::io::Error),

    #[error("failed to parse DDD container")]
    BinRw(#[from] binrw::Error),

    #[error("line {line}: {message}")]
    ObjParse { line: usize, message: String },

    #[error("{name} index {index} out of range for count {count}")]
    IndexOutOfRange {
        name: &'static str,
        index: usize,
        count: usize,
    },

    #[error("{name} count {count} does not fit the container's count field")]
    CountOverflow { name: &'static str, count: usize },
}

/// Load a DDD model from `path` with coordinates decoded to world space.
pub fn load_model<P: AsRef<Path>>(path: P) -> Result<DddModel, DddError> {
    let ddd = Ddd::from_file(path)?;
    Ok(DddModel::from_ddd(&ddd))
}

#[derive(Debug, PartialEq, Clone)]
pub struct DddModel {
    /// World units per raw coordinate unit, `scale / 20000` in the container.
    pub scale: f32,
    pub flags: DddFlags,
    pub shadow_texture_indices: [u8; 4],
    pub external_bone_frame_file: Option<String>,
    pub base_models: Vec<DddBaseModel>,
    /// Internal bone frames in raw form. Empty when frames are external.
    pub bone_frames: Vec<BoneFrame>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DddBaseModel {
    pub vertices: Vec<DddVertex>,
    /// Texture coordinates in OBJ space (u right, v up).
    pub texture_vertices: Vec<Vec2>,
    pub textures: [Option<DddTexture>; 4],
    /// Collision size per joint.
    pub joints: Vec<u8>,
    pub bones: Vec<Bone>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct DddVertex {
    pub position: Vec3,
    pub bone_id: u8,
    /// Skinning weight in 0.0..=1.0, quantized to even steps of 1/255.
    pub weight: f32,
    pub anchored: bool,
}

/// An active texture slot. Inactive slots are `None` at this layer and
/// single zero bytes in the container.
#[derive(Debug, PartialEq, Clone)]
pub struct DddTexture {
    pub rendering_mode: u8,
    pub flags: TextureFlags,
    pub alpha: u8,
    pub triangles: Vec<Triangle>,
}

impl DddModel {
    pub fn from_ddd(ddd: &Ddd) -> Self {
        let scale = ddd.scale as f32 / SCALE_DIVISOR;

        let base_models = ddd
            .base_models
            .iter()
            .map(|base_model| DddBaseModel {
                vertices: base_model
                    .vertices
                    .iter()
                    .map(|v| DddVertex {
                        position: vec3(v.x as f32, v.y as f32, v.z as f32) * scale,
                        bone_id: v.bone_id,
                        weight: v.bone_weight() as f32 / 255.0,
                        anchored: v.anchored(),
                    })
                    .collect(),
                texture_vertices: base_model
                    .texture_vertices
                    .iter()
                    .map(|t| vec2(t.u as f32 / 256.0, -(t.v as f32) / 256.0))
                    .collect(),
                textures: base_model.textures.each_ref().map(|texture| {
                    texture.data.as_ref().map(|data| DddTexture {
                        rendering_mode: texture.rendering_mode,
                        flags: data.flags,
                        alpha: data.alpha,
                        triangles: data.triangles.clone(),
                    })
                }),
                joints: base_model.joints.iter().map(|j| j.collision_size).collect(),
                bones: base_model.bones.clone(),
            })
            .collect();

        Self {
            scale,
            flags: ddd.flags,
            shadow_texture_indices: ddd.shadow_texture_indices,
            external_bone_frame_file: ddd.external_bone_frame_file_name(),
            base_models,
            bone_frames: ddd.bone_frames.clone(),
        }
    }

    pub fn to_ddd(&self) -> Result<Ddd, DddError> {
        let scale = (self.scale * SCALE_DIVISOR).round() as u16;

        let base_models = self
            .base_models
            .iter()
            .map(|base_model| {
                check_u16_count("vertex", base_model.vertices.len())?;
                check_u16_count("texture vertex", base_model.texture_vertices.len())?;
                check_u16_count("joint", base_model.joints.len())?;
                check_u16_count("bone", base_model.bones.len())?;

                Ok(BaseModel {
                    vertices: base_model
                        .vertices
                        .iter()
                        .map(|v| Vertex {
                            x: quantize(v.position.x, self.scale),
                            y: quantize(v.position.y, self.scale),
                            z: quantize(v.position.z, self.scale),
                            bone_id: v.bone_id,
                            unk: 0,
                            weight: VertexWeight::from(
                                (((v.weight * 255.0).round() as u8) >> 1)
                                    | ((v.anchored as u8) << 7),
                            ),
                        })
                        .collect(),
                    texture_vertices: base_model
                        .texture_vertices
                        .iter()
                        .map(|t| soulfu_lib::ddd::TextureVertex {
                            u: (t.x * 256.0).round() as i16,
                            v: (-t.y * 256.0).round() as i16,
                        })
                        .collect(),
                    textures: base_model.textures.each_ref().map(|slot| match slot {
                        Some(texture) => Texture {
                            rendering_mode: texture.rendering_mode,
                            data: Some(TextureData {
                                flags: texture.flags,
                                alpha: texture.alpha,
                                triangles: texture.triangles.clone(),
                            }),
                        },
                        None => Texture::disabled(),
                    }),
                    joints: base_model
                        .joints
                        .iter()
                        .map(|&collision_size| Joint { collision_size })
                        .collect(),
                    bones: base_model.bones.clone(),
                })
            })
            .collect::<Result<Vec<_>, DddError>>()?;

        if self.base_models.len() > u8::MAX as usize {
            return Err(DddError::CountOverflow {
                name: "base model",
                count: self.base_models.len(),
            });
        }
        check_u16_count("bone frame", self.bone_frames.len())?;

        for frame in &self.bone_frames {
            let id = frame.base_model_id as usize;
            if id >= self.base_models.len() {
                return Err(DddError::IndexOutOfRange {
                    name: "bone frame base model",
                    index: id,
                    count: self.base_models.len(),
                });
            }
        }

        Ok(Ddd {
            scale,
            flags: self.flags,
            unk: 0,
            shadow_texture_indices: self.shadow_texture_indices,
            external_bone_frame_file: self
                .external_bone_frame_file
                .as_deref()
                .map(frame_file_bytes),
            base_models,
            bone_frames: self.bone_frames.clone(),
        })
    }
}

fn check_u16_count(name: &'static str, count: usize) -> Result<(), DddError> {
    if count > u16::MAX as usize {
        Err(DddError::CountOverflow { name, count })
    } else {
        Ok(())
    }
}

fn quantize(world: f32, scale: f32) -> i16 {
    (world / scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn frame_file_bytes(name: &str) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    for (dst, src) in bytes.iter_mut().zip(name.bytes()) {
        *dst = src;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use hexlit::hex;

    fn geometry_ddd() -> Ddd {
        // Two vertices, one texture vertex, one triangle in slot 0.
        let buffer = hex!(
            0014 0000 00 01 0000 00000000
            0002 0001 0000 0000
            03e8 0000 0000 00 00 FF // vertex 0 at x = 1000
            0000 03e8 0000 00 00 FF // vertex 1 at y = 1000
            0080 ff80 // texture vertex
            01 00 FF 0001 0000 0000 0001 0000 0000 0000
            00 00 00
        );
        Ddd::from_bytes(buffer).unwrap()
    }

    #[test]
    fn model_scales_vertices_and_texture_vertices() {
        let model = DddModel::from_ddd(&geometry_ddd());

        assert_relative_eq!(0.001, model.scale);
        let base_model = &model.base_models[0];
        assert_eq!(vec3(1.0, 0.0, 0.0), base_model.vertices[0].position);
        assert_eq!(vec3(0.0, 1.0, 0.0), base_model.vertices[1].position);
        assert_eq!(vec2(0.5, 0.5), base_model.texture_vertices[0]);
        assert!(base_model.vertices[0].anchored);
        assert_relative_eq!(254.0 / 255.0, base_model.vertices[0].weight);
    }

    #[test]
    fn model_round_trips_raw_container() {
        let ddd = geometry_ddd();
        let model = DddModel::from_ddd(&ddd);
        assert_eq!(ddd, model.to_ddd().unwrap());
    }

    #[test]
    fn to_ddd_rejects_dangling_bone_frame() {
        let mut model = DddModel::from_ddd(&geometry_ddd());
        model.bone_frames.push(BoneFrame {
            action: 0,
            action_modifier: 0,
            base_model_id: 5,
            offset_x: 0,
            offset_y: 0,
            bone_normals: Vec::new(),
            joint_positions: Vec::new(),
            shadow_textures: [ShadowTexture::disabled(); 4],
        });

        assert!(matches!(
            model.to_ddd(),
            Err(DddError::IndexOutOfRange { index: 5, .. })
        ));
    }
}
