//! Wavefront OBJ text for DDD models.
//!
//! Export renders one document per base model. Geometry becomes real OBJ
//! statements while skeletal and shadow data, which OBJ cannot express,
//! becomes comment blocks. Import reads the geometry statements back and
//! synthesizes a fixed placeholder skeleton, so skeletal data never
//! round trips through text.
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3, vec2, vec3};
use log::{debug, info};
use soulfu_lib::ddd::{
    Bone, BoneFrame, BoneNormal, Ddd, DddFlags, JointPosition, ShadowTexture, TextureFlags,
    Triangle, TriangleVertex,
};

use crate::action::action_name;
use crate::{DddBaseModel, DddError, DddModel, DddTexture, DddVertex};

/// Material library referenced by every exported document.
pub const MATERIAL_LIB: &str = "soulfu.mtl";

/// Scale written into imported containers, 0.001 world units per raw unit.
pub const IMPORT_SCALE: f32 = 0.001;

/// Header flags written into imported containers.
pub const IMPORT_FLAGS: u16 = 0xBFFF;

/// The output name for the base model at `index`.
pub fn obj_file_name(index: usize) -> String {
    format!("model{index}.OBJ")
}

/// Write one OBJ document for the base model at `index`, including the
/// comment blocks for every internal bone frame that references it.
pub fn write_obj<W: Write>(
    writer: &mut W,
    model: &DddModel,
    index: usize,
    source_name: &str,
) -> Result<(), DddError> {
    let base_model =
        model
            .base_models
            .get(index)
            .ok_or_else(|| DddError::IndexOutOfRange {
                name: "base model",
                index,
                count: model.base_models.len(),
            })?;

    writeln!(writer, "# SoulFu DDD base model {index}")?;
    writeln!(writer, "# source: {source_name}")?;
    writeln!(writer, "# scale: {}", model.scale)?;
    writeln!(writer, "# flags: {:#06x}", u16::from(model.flags))?;
    if let Some(name) = &model.external_bone_frame_file {
        writeln!(writer, "# external bone frames: {name}")?;
    }
    writeln!(writer, "mtllib {MATERIAL_LIB}")?;

    for (i, vertex) in base_model.vertices.iter().enumerate() {
        let p = vertex.position;
        writeln!(writer, "v {} {} {}", p.x, p.y, p.z)?;
        writeln!(
            writer,
            "# vertex {i}: bone {}, weight {:.3}, anchored {}",
            vertex.bone_id, vertex.weight, vertex.anchored
        )?;
    }

    for uv in &base_model.texture_vertices {
        writeln!(writer, "vt {} {}", uv.x, uv.y)?;
    }

    for (slot, texture) in base_model.textures.iter().enumerate() {
        let Some(texture) = texture else {
            continue;
        };
        if texture.triangles.is_empty() {
            continue;
        }

        writeln!(writer, "usemtl texture{slot}")?;
        for triangle in &texture.triangles {
            let [a, b, c] = triangle.vertices;
            writeln!(
                writer,
                "f {}/{} {}/{} {}/{}",
                a.vertex_index + 1,
                a.texture_vertex_index + 1,
                b.vertex_index + 1,
                b.texture_vertex_index + 1,
                c.vertex_index + 1,
                c.texture_vertex_index + 1,
            )?;
        }
    }

    for (i, collision_size) in base_model.joints.iter().enumerate() {
        writeln!(writer, "# joint {i}: collision size {collision_size}")?;
    }
    for bone in &base_model.bones {
        writeln!(
            writer,
            "# bone {}: joints {} -> {}",
            bone.id, bone.joint_a, bone.joint_b
        )?;
    }

    if model.external_bone_frame_file.is_none() {
        for frame in model
            .bone_frames
            .iter()
            .filter(|frame| frame.base_model_id as usize == index)
        {
            write_bone_frame(writer, model, frame)?;
        }
    }

    Ok(())
}

fn write_bone_frame<W: Write>(
    writer: &mut W,
    model: &DddModel,
    frame: &BoneFrame,
) -> Result<(), DddError> {
    writeln!(
        writer,
        "# bone frame: action {}, modifier {:#04x}, offset ({}, {})",
        action_name(frame.action),
        frame.action_modifier,
        frame.offset_x,
        frame.offset_y
    )?;

    for (i, normal) in frame.bone_normals.iter().enumerate() {
        // Raw directions are unnormalized fixed point. A zero vector stays
        // zero instead of dividing by its zero length.
        let direction =
            vec3(normal.x as f32, normal.y as f32, normal.z as f32).normalize_or_zero();
        writeln!(
            writer,
            "#   bone {i}: direction {} {} {}",
            direction.x, direction.y, direction.z
        )?;
    }

    for (i, joint) in frame.joint_positions.iter().enumerate() {
        writeln!(
            writer,
            "#   joint {i}: position {} {} {}",
            joint.x as f32 * model.scale,
            joint.y as f32 * model.scale,
            joint.z as f32 * model.scale
        )?;
    }

    for (i, shadow) in frame.shadow_textures.iter().enumerate() {
        if let Some(quad) = shadow.quad {
            writeln!(
                writer,
                "#   shadow {i}: alpha {}, quad ({}, {}) ({}, {}) ({}, {}) ({}, {})",
                shadow.alpha,
                quad[0].u,
                quad[0].v,
                quad[1].u,
                quad[1].v,
                quad[2].u,
                quad[2].v,
                quad[3].u,
                quad[3].v,
            )?;
        }
    }

    Ok(())
}

/// Write every base model of `model` as `model<i>.OBJ` into `output_dir`.
pub fn write_objs(
    model: &DddModel,
    output_dir: &Path,
    source_name: &str,
) -> Result<Vec<PathBuf>, DddError> {
    let mut paths = Vec::new();
    for index in 0..model.base_models.len() {
        let path = output_dir.join(obj_file_name(index));
        info!("writing {}", path.display());

        let mut writer = std::io::BufWriter::new(std::fs::File::create(&path)?);
        write_obj(&mut writer, model, index, source_name)?;
        paths.push(path);
    }
    Ok(paths)
}

/// A parsed OBJ document with faces already triangulated and bucketed by
/// texture slot.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct ObjMesh {
    pub positions: Vec<Vec3>,
    pub texcoords: Vec<Vec2>,
    pub faces: [Vec<[FaceVertex; 3]>; 4],
}

/// 0 based indices into [ObjMesh::positions] and [ObjMesh::texcoords].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FaceVertex {
    pub position: usize,
    pub texcoord: usize,
}

/// Parse an OBJ document.
///
/// Recognized statements are `v`, `vt`, `usemtl` and `f`. Every other
/// keyword and all comments are skipped. `usemtl` advances the active
/// texture slot, saturating at slot 3. Faces with more than 3 corners are
/// fan triangulated from the first corner, which is only correct for
/// convex planar polygons.
pub fn import_obj<R: BufRead>(reader: R) -> Result<ObjMesh, DddError> {
    let mut mesh = ObjMesh::default();
    let mut active_slot = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i + 1;
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("v") => {
                let x = parse_float(parts.next(), line_number)?;
                let y = parse_float(parts.next(), line_number)?;
                let z = parse_float(parts.next(), line_number)?;
                mesh.positions.push(vec3(x, y, z));
            }
            Some("vt") => {
                let u = parse_float(parts.next(), line_number)?;
                let v = parse_float(parts.next(), line_number)?;
                mesh.texcoords.push(vec2(u, v));
            }
            Some("usemtl") => {
                active_slot = Some(match active_slot {
                    None => 0,
                    Some(slot) => usize::min(slot + 1, 3),
                });
            }
            Some("f") => {
                let corners = parts
                    .map(|token| parse_face_vertex(token, line_number))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(obj_error(line_number, "face needs at least 3 corners"));
                }

                let triangles = &mut mesh.faces[active_slot.unwrap_or(0)];
                for i in 1..corners.len() - 1 {
                    triangles.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            _ => (),
        }
    }

    debug!(
        "parsed {} positions, {} texcoords, {} triangles",
        mesh.positions.len(),
        mesh.texcoords.len(),
        mesh.faces.iter().map(Vec::len).sum::<usize>()
    );
    Ok(mesh)
}

fn obj_error(line: usize, message: impl Into<String>) -> DddError {
    DddError::ObjParse {
        line,
        message: message.into(),
    }
}

fn parse_float(token: Option<&str>, line: usize) -> Result<f32, DddError> {
    let token = token.ok_or_else(|| obj_error(line, "expected a number"))?;
    token
        .parse()
        .map_err(|_| obj_error(line, format!("invalid number {token}")))
}

fn parse_face_vertex(token: &str, line: usize) -> Result<FaceVertex, DddError> {
    // vertex/texcoord with an optional ignored normal index.
    let mut indices = token.split('/');
    let position = parse_index(indices.next(), line)?;
    let texcoord = parse_index(indices.next(), line)?;
    Ok(FaceVertex { position, texcoord })
}

fn parse_index(token: Option<&str>, line: usize) -> Result<usize, DddError> {
    let token =
        token.ok_or_else(|| obj_error(line, "face corner must be vertex/texcoord"))?;
    let index: usize = token
        .parse()
        .map_err(|_| obj_error(line, format!("invalid index {token}")))?;
    index
        .checked_sub(1)
        .ok_or_else(|| obj_error(line, "face indices are 1 based"))
}

impl ObjMesh {
    /// Build a single base model container with the fixed import scale and
    /// a placeholder skeleton of two joints, one bone and one bone frame.
    pub fn to_model(&self) -> Result<DddModel, DddError> {
        let mut textures: [Option<DddTexture>; 4] = [None, None, None, None];
        for (slot, triangles) in self.faces.iter().enumerate() {
            if triangles.is_empty() {
                continue;
            }

            let triangles = triangles
                .iter()
                .map(|corners| {
                    let vertices = corners
                        .iter()
                        .map(|corner| {
                            check_index("vertex", corner.position, self.positions.len())?;
                            check_index("texture vertex", corner.texcoord, self.texcoords.len())?;
                            Ok(TriangleVertex {
                                vertex_index: corner.position as u16,
                                texture_vertex_index: corner.texcoord as u16,
                            })
                        })
                        .collect::<Result<Vec<_>, DddError>>()?;
                    Ok(Triangle {
                        vertices: [vertices[0], vertices[1], vertices[2]],
                    })
                })
                .collect::<Result<Vec<_>, DddError>>()?;

            textures[slot] = Some(DddTexture {
                rendering_mode: 1,
                flags: TextureFlags::from(0u8),
                alpha: 255,
                triangles,
            });
        }

        let base_model = DddBaseModel {
            vertices: self
                .positions
                .iter()
                .map(|&position| DddVertex {
                    position,
                    bone_id: 0,
                    weight: 254.0 / 255.0,
                    anchored: true,
                })
                .collect(),
            texture_vertices: self.texcoords.clone(),
            textures,
            joints: vec![8, 8],
            bones: vec![Bone {
                id: 0,
                joint_a: 0,
                joint_b: 1,
            }],
        };

        Ok(DddModel {
            scale: IMPORT_SCALE,
            flags: DddFlags::from(IMPORT_FLAGS),
            shadow_texture_indices: [0; 4],
            external_bone_frame_file: None,
            base_models: vec![base_model],
            bone_frames: vec![placeholder_bone_frame()],
        })
    }

    pub fn to_ddd(&self) -> Result<Ddd, DddError> {
        self.to_model()?.to_ddd()
    }
}

// The importer never reconstructs skeletal data from text, so encoded
// containers carry this fixed pose instead.
fn placeholder_bone_frame() -> BoneFrame {
    BoneFrame {
        action: 0,
        action_modifier: 0,
        base_model_id: 0,
        offset_x: 0,
        offset_y: 0,
        bone_normals: vec![BoneNormal { x: 0, y: 0, z: 256 }],
        joint_positions: vec![JointPosition { x: 0, y: 0, z: 0 }; 2],
        shadow_textures: [ShadowTexture::disabled(); 4],
    }
}

fn check_index(name: &'static str, index: usize, count: usize) -> Result<(), DddError> {
    if index >= count {
        Err(DddError::IndexOutOfRange { name, index, count })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use hexlit::hex;

    fn import(text: &str) -> ObjMesh {
        import_obj(Cursor::new(text)).unwrap()
    }

    #[test]
    fn import_fan_triangulates_polygons() {
        // An n-gon yields n-2 triangles, all sharing the first corner.
        let mesh = import(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nv 0 2 0\nvt 0 0\n\
             f 1/1 2/1 3/1 4/1 5/1\n",
        );

        let triangles = &mesh.faces[0];
        assert_eq!(3, triangles.len());
        for (i, triangle) in triangles.iter().enumerate() {
            assert_eq!(0, triangle[0].position);
            assert_eq!(i + 1, triangle[1].position);
            assert_eq!(i + 2, triangle[2].position);
        }
    }

    #[test]
    fn import_usemtl_saturates_at_slot_3() {
        let mesh = import(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nvt 0 0\n\
             usemtl a\nusemtl b\nusemtl c\nusemtl d\nusemtl e\n\
             f 1/1 2/1 3/1\n",
        );

        assert!(mesh.faces[0].is_empty());
        assert_eq!(1, mesh.faces[3].len());
    }

    #[test]
    fn import_reports_malformed_numbers() {
        let result = import_obj(Cursor::new("v 1.0 nope 3.0\n"));
        assert!(matches!(result, Err(DddError::ObjParse { line: 1, .. })));

        let result = import_obj(Cursor::new("vt 0 0\nf 0/1 2/1 3/1\n"));
        assert!(matches!(result, Err(DddError::ObjParse { line: 2, .. })));
    }

    #[test]
    fn import_encodes_quantized_vertices() {
        // With the fixed import scale, x = 1.0 stores raw 1000 in the first
        // two bytes of the first vertex.
        let mesh = import("v 1.0 2.0 3.0\nv 0 0 0\nv 0 0 0\nvt 0 0\nf 1/1 2/1 3/1\n");
        let ddd = mesh.to_ddd().unwrap();

        let mut writer = Cursor::new(Vec::new());
        ddd.write(&mut writer).unwrap();
        let bytes = writer.into_inner();

        // 12 byte header, 8 byte base model prefix, then vertex 0.
        assert_eq!(&hex!(03e8)[..], &bytes[20..22]);
        assert_eq!(&hex!(07d0)[..], &bytes[22..24]);
        assert_eq!(&hex!(0BB8)[..], &bytes[24..26]);
    }

    #[test]
    fn import_to_ddd_counts_and_slots() {
        let mesh = import(
            "v 0 0 0\nv 1 0 0\nv 1 1 0\nvt 0 0\nvt 1 0\nvt 1 1\n\
             usemtl first\nf 1/1 2/2 3/3\nf 1/1 3/3 2/2\n",
        );
        let ddd = mesh.to_ddd().unwrap();

        assert_eq!(20, ddd.scale);
        assert!(!ddd.flags.external_bone_frames());
        let base_model = &ddd.base_models[0];
        assert_eq!(3, base_model.vertices.len());
        assert_eq!(3, base_model.texture_vertices.len());
        assert_eq!(2, base_model.textures[0].triangle_count());
        assert_eq!(0, base_model.textures[1].triangle_count());
        assert_eq!(2, base_model.joints.len());
        assert_eq!(1, base_model.bones.len());
        assert_eq!(1, ddd.bone_frames.len());
    }

    #[test]
    fn export_import_preserves_geometry_counts() {
        // Decode, export, re-import, re-encode, decode again. Geometry
        // counts survive the text round trip, skeletal data does not.
        let buffer = hex!(
            0014 0000 00 01 0001 00000000
            0003 0002 0001 0001
            03e8 0000 0000 00 00 FF
            0000 03e8 0000 00 00 FF
            0000 0000 03e8 00 00 FF
            0040 ffc0 0080 ff80
            01 00 FF 0002
            0000 0000 0001 0001 0002 0000
            0000 0000 0002 0000 0001 0001
            00 00 00
            05
            01 0000 0000
            00 00 00 0000 0000
            0000 0000 0100
            0001 0002 0003
            00 00 00 00
        );
        let ddd = Ddd::from_bytes(buffer).unwrap();
        let model = DddModel::from_ddd(&ddd);

        let mut text = Cursor::new(Vec::new());
        write_obj(&mut text, &model, 0, "TEST.DDD").unwrap();

        let mesh = import_obj(Cursor::new(text.into_inner())).unwrap();
        let reencoded = mesh.to_ddd().unwrap();

        let original = &ddd.base_models[0];
        let roundtripped = &reencoded.base_models[0];
        assert_eq!(original.vertices.len(), roundtripped.vertices.len());
        assert_eq!(
            original.texture_vertices.len(),
            roundtripped.texture_vertices.len()
        );
        for slot in 0..4 {
            assert_eq!(
                original.textures[slot].triangle_count(),
                roundtripped.textures[slot].triangle_count()
            );
        }
    }

    #[test]
    fn import_compacts_sparse_texture_slots() {
        // usemtl advances a slot cursor instead of parsing material names,
        // so active slots that are not a prefix shift toward slot 0 on
        // re-import. Slots {0, 2} come back as {0, 1}.
        let triangle = Triangle {
            vertices: [
                TriangleVertex {
                    vertex_index: 0,
                    texture_vertex_index: 0,
                },
                TriangleVertex {
                    vertex_index: 1,
                    texture_vertex_index: 0,
                },
                TriangleVertex {
                    vertex_index: 2,
                    texture_vertex_index: 0,
                },
            ],
        };
        let texture = |triangles: Vec<Triangle>| {
            Some(DddTexture {
                rendering_mode: 1,
                flags: TextureFlags::from(0u8),
                alpha: 255,
                triangles,
            })
        };
        let model = DddModel {
            scale: IMPORT_SCALE,
            flags: DddFlags::from(0u16),
            shadow_texture_indices: [0; 4],
            external_bone_frame_file: None,
            base_models: vec![DddBaseModel {
                vertices: vec![
                    DddVertex {
                        position: vec3(0.0, 0.0, 0.0),
                        bone_id: 0,
                        weight: 254.0 / 255.0,
                        anchored: false,
                    };
                    3
                ],
                texture_vertices: vec![vec2(0.0, 0.0)],
                textures: [texture(vec![triangle]), None, texture(vec![triangle; 2]), None],
                joints: Vec::new(),
                bones: Vec::new(),
            }],
            bone_frames: Vec::new(),
        };

        let mut text = Cursor::new(Vec::new());
        write_obj(&mut text, &model, 0, "TEST.DDD").unwrap();
        let mesh = import_obj(Cursor::new(text.into_inner())).unwrap();

        assert_eq!(1, mesh.faces[0].len());
        assert_eq!(2, mesh.faces[1].len());
        assert!(mesh.faces[2].is_empty());
        assert!(mesh.faces[3].is_empty());
    }

    #[test]
    fn export_normalizes_bone_directions() {
        let buffer = hex!(
            0014 0000 00 01 0001 00000000
            0000 0000 0000 0001
            00 00 00 00
            07 0000 0000
            00 00 00 0000 0000
            0003 0004 0000 // length 5 direction
            00 00 00 00
        );
        let ddd = Ddd::from_bytes(buffer).unwrap();
        let model = DddModel::from_ddd(&ddd);

        let mut text = Cursor::new(Vec::new());
        write_obj(&mut text, &model, 0, "TEST.DDD").unwrap();
        let text = String::from_utf8(text.into_inner()).unwrap();

        assert!(text.contains("bone 0: direction 0.6 0.8 0"));
    }
}
