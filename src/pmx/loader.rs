//! PMX 流式解析
//!
//! 按固定节顺序向前消费：头部 → 顶点 → 面 → 纹理 → 材质 → 骨骼 →
//! Morph → 显示枠 → 刚体 → 关节。索引宽度与字符串编码由头部声明。

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::io::{is_unexpected_eof, ByteStream};
use crate::{MmdError, Result};

use super::types::*;

/// 从文件加载模型
pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
    let file = File::open(path.as_ref())?;
    parse(BufReader::new(file))
}

/// 从字节流解析模型
pub fn parse<R: Read>(reader: R) -> Result<Model> {
    let mut stream = ByteStream::new(reader);
    let header = load_header(&mut stream)?;
    let mut fs = PmxStream { s: stream, header };
    let model = load_model(&mut fs)?;
    validate(&model)?;

    log::info!(
        "PMX parsed: {} vertices, {} faces, {} materials, {} bones, {} morphs",
        model.vertices.len(),
        model.faces.len(),
        model.materials.len(),
        model.bones.len(),
        model.morphs.len(),
    );

    Ok(model)
}

struct PmxStream<R: Read> {
    s: ByteStream<R>,
    header: Header,
}

fn load_header<R: Read>(s: &mut ByteStream<R>) -> Result<Header> {
    let mut signature = [0u8; 4];
    s.read_bytes(&mut signature)?;
    if signature[..3] != PMX_SIGNATURE[..3] {
        return Err(MmdError::Format(format!(
            "invalid signature: {:?}",
            &signature
        )));
    }

    let version = s.read_f32()?;
    if version != PMX_VERSION {
        return Err(MmdError::Format(format!("unsupported version: {}", version)));
    }

    // 格式标记不符仅告警，继续解析
    let marker = s.read_u8()?;
    if marker != 8 || signature[3] != PMX_SIGNATURE[3] {
        log::warn!("format marker mismatch, this file might be corrupted");
    }

    let encoding = if s.read_i8()? == 0 {
        TextEncoding::Utf16Le
    } else {
        TextEncoding::Utf8
    };

    Ok(Header {
        signature,
        version,
        encoding,
        additional_uvs: s.read_u8()?,
        vertex_index_size: s.read_u8()?,
        texture_index_size: s.read_u8()?,
        material_index_size: s.read_u8()?,
        bone_index_size: s.read_u8()?,
        morph_index_size: s.read_u8()?,
        rigid_index_size: s.read_u8()?,
    })
}

impl<R: Read> PmxStream<R> {
    /// 长度前缀字符串（4 字节的字节数 + 原始字节，按头部编码解码）
    fn read_str(&mut self) -> Result<String> {
        let length = self.s.read_i32()?;
        if length < 0 {
            return Err(MmdError::PmxParse(format!(
                "negative string length: {}",
                length
            )));
        }
        let mut buf = vec![0u8; length as usize];
        self.s.read_bytes(&mut buf)?;
        // 解码失败以替换字符处理，不中断
        let decoded = match self.header.encoding {
            TextEncoding::Utf16Le => encoding_rs::UTF_16LE.decode(&buf).0,
            TextEncoding::Utf8 => encoding_rs::UTF_8.decode(&buf).0,
        };
        Ok(decoded.into_owned())
    }

    fn read_vertex_index(&mut self) -> Result<u32> {
        Ok(self.s.read_index(self.header.vertex_index_size, true)? as u32)
    }

    fn read_texture_index(&mut self) -> Result<i32> {
        self.s.read_index(self.header.texture_index_size, false)
    }

    fn read_bone_index(&mut self) -> Result<i32> {
        self.s.read_index(self.header.bone_index_size, false)
    }

    fn read_morph_index(&mut self) -> Result<i32> {
        self.s.read_index(self.header.morph_index_size, false)
    }

    fn read_material_index(&mut self) -> Result<i32> {
        self.s.read_index(self.header.material_index_size, false)
    }

    fn read_rigid_index(&mut self) -> Result<i32> {
        self.s.read_index(self.header.rigid_index_size, false)
    }

    fn read_count(&mut self) -> Result<usize> {
        let count = self.s.read_i32()?;
        if count < 0 {
            return Err(MmdError::PmxParse(format!("negative count: {}", count)));
        }
        Ok(count as usize)
    }
}

fn load_model<R: Read>(fs: &mut PmxStream<R>) -> Result<Model> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;
    let comment = fs.read_str()?;
    let comment_en = fs.read_str()?;

    let vertex_count = fs.read_count()?;
    let mut vertices = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        vertices.push(load_vertex(fs)?);
    }

    // 面计数为面顶点数
    let face_count = fs.read_count()? / 3;
    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        faces.push([
            fs.read_vertex_index()?,
            fs.read_vertex_index()?,
            fs.read_vertex_index()?,
        ]);
    }

    let texture_count = fs.read_count()?;
    let mut textures = Vec::with_capacity(texture_count);
    for _ in 0..texture_count {
        textures.push(fs.read_str()?);
    }

    let material_count = fs.read_count()?;
    let mut materials = Vec::with_capacity(material_count);
    for _ in 0..material_count {
        materials.push(load_material(fs)?);
    }

    let bone_count = fs.read_count()?;
    let mut bones = Vec::with_capacity(bone_count);
    for _ in 0..bone_count {
        bones.push(load_bone(fs)?);
    }

    let morph_count = fs.read_count()?;
    let mut morphs = Vec::with_capacity(morph_count);
    for _ in 0..morph_count {
        morphs.push(load_morph(fs)?);
    }

    let mut display_frames = Model::seed_display_frames();
    let display_count = fs.read_count()?;
    for _ in 0..display_count {
        display_frames.push(load_display_frame(fs)?);
    }

    let rigid_count = fs.read_count()?;
    let mut rigids = Vec::with_capacity(rigid_count);
    for _ in 0..rigid_count {
        rigids.push(load_rigid(fs)?);
    }

    let joint_count = fs.read_count()?;
    let mut joints = Vec::with_capacity(joint_count);
    for _ in 0..joint_count {
        joints.push(load_joint(fs)?);
    }

    // 完整解析后不允许剩余字节
    let rest = fs.s.read_rest()?;
    if rest != 0 {
        return Err(MmdError::TrailingData(rest));
    }

    Ok(Model {
        header: fs.header.clone(),
        name,
        name_en,
        comment,
        comment_en,
        vertices,
        faces,
        textures,
        materials,
        bones,
        morphs,
        display_frames,
        rigids,
        joints,
    })
}

fn load_vertex<R: Read>(fs: &mut PmxStream<R>) -> Result<Vertex> {
    let position = fs.s.read_vec3()?;
    let normal = fs.s.read_vec3()?;
    let uv = fs.s.read_vec2()?;

    let mut additional_uvs = Vec::with_capacity(fs.header.additional_uvs as usize);
    for _ in 0..fs.header.additional_uvs {
        additional_uvs.push(fs.s.read_vec4()?);
    }

    let weight = load_bone_weight(fs)?;
    let edge_scale = fs.s.read_f32()?;

    Ok(Vertex {
        position,
        normal,
        uv,
        additional_uvs,
        weight,
        edge_scale,
    })
}

fn load_bone_weight<R: Read>(fs: &mut PmxStream<R>) -> Result<BoneWeight> {
    let kind = fs.s.read_u8()?;
    let weight = match kind {
        0 => BoneWeight::Bdef1 {
            bone: fs.read_bone_index()?,
        },
        1 => BoneWeight::Bdef2 {
            bones: [fs.read_bone_index()?, fs.read_bone_index()?],
            weight: fs.s.read_f32()?,
        },
        2 => BoneWeight::Bdef4 {
            bones: [
                fs.read_bone_index()?,
                fs.read_bone_index()?,
                fs.read_bone_index()?,
                fs.read_bone_index()?,
            ],
            weights: [
                fs.s.read_f32()?,
                fs.s.read_f32()?,
                fs.s.read_f32()?,
                fs.s.read_f32()?,
            ],
        },
        3 => BoneWeight::Sdef {
            bones: [fs.read_bone_index()?, fs.read_bone_index()?],
            weight: fs.s.read_f32()?,
            c: fs.s.read_vec3()?,
            r0: fs.s.read_vec3()?,
            r1: fs.s.read_vec3()?,
        },
        _ => {
            return Err(MmdError::PmxParse(format!(
                "unknown bone weight type: {}",
                kind
            )));
        }
    };
    Ok(weight)
}

fn load_material<R: Read>(fs: &mut PmxStream<R>) -> Result<Material> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;

    let diffuse = fs.s.read_vec4()?;
    let specular_color = fs.s.read_vec3()?;
    let specular_scale = fs.s.read_f32()?;
    let ambient_color = fs.s.read_vec3()?;

    let flags = MaterialFlags::from_bits_truncate(fs.s.read_u8()?);

    let edge_color = fs.s.read_vec4()?;
    let edge_size = fs.s.read_f32()?;

    let texture_index = fs.read_texture_index()?;
    let sphere_texture_index = fs.read_texture_index()?;
    let sphere_texture_mode = fs.s.read_u8()?;

    let toon = if fs.s.read_i8()? == 1 {
        Toon::Shared(fs.s.read_i8()?)
    } else {
        Toon::Texture(fs.read_texture_index()?)
    };

    let comment = fs.read_str()?;
    let face_vertex_count = fs.s.read_i32()?;

    Ok(Material {
        name,
        name_en,
        diffuse,
        specular_color,
        specular_scale,
        ambient_color,
        flags,
        edge_color,
        edge_size,
        texture_index,
        sphere_texture_index,
        sphere_texture_mode,
        toon,
        comment,
        face_vertex_count,
    })
}

fn load_bone<R: Read>(fs: &mut PmxStream<R>) -> Result<Bone> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;

    let location = fs.s.read_vec3()?;
    let parent_index = fs.read_bone_index()?;
    let transform_order = fs.s.read_i32()?;

    let flags = BoneFlags::from_bits_truncate(fs.s.read_u16()?);

    let display_connection = if flags.contains(BoneFlags::CONNECT_TO_BONE) {
        DisplayConnection::Bone(fs.read_bone_index()?)
    } else {
        DisplayConnection::Offset(fs.s.read_vec3()?)
    };

    let grant = if flags.intersects(BoneFlags::GRANT_TRANSLATION | BoneFlags::GRANT_ROTATION) {
        Some(Grant {
            parent_index: fs.read_bone_index()?,
            rate: fs.s.read_f32()?,
        })
    } else {
        None
    };

    let fixed_axis = if flags.contains(BoneFlags::FIXED_AXIS) {
        Some(fs.s.read_vec3()?)
    } else {
        None
    };

    let local_axes = if flags.contains(BoneFlags::LOCAL_AXIS) {
        Some((fs.s.read_vec3()?, fs.s.read_vec3()?))
    } else {
        None
    };

    // 外部父键与「物理后变换」同由第 12 位标志控制
    let outside_parent_key = if flags.contains(BoneFlags::AFTER_PHYSICS) {
        Some(fs.s.read_i32()?)
    } else {
        None
    };

    let ik = if flags.contains(BoneFlags::IK) {
        Some(load_ik(fs)?)
    } else {
        None
    };

    Ok(Bone {
        name,
        name_en,
        location,
        parent_index,
        transform_order,
        flags,
        display_connection,
        grant,
        fixed_axis,
        local_axes,
        outside_parent_key,
        ik,
    })
}

fn load_ik<R: Read>(fs: &mut PmxStream<R>) -> Result<Ik> {
    let target_bone = fs.read_bone_index()?;
    let iterations = fs.s.read_i32()?;
    let limit_radius = fs.s.read_f32()?;

    let link_count = fs.read_count()?;
    let mut links = Vec::with_capacity(link_count);
    for _ in 0..link_count {
        links.push(load_ik_link(fs)?);
    }

    Ok(Ik {
        target_bone,
        iterations,
        limit_radius,
        links,
    })
}

fn load_ik_link<R: Read>(fs: &mut PmxStream<R>) -> Result<IkLink> {
    let bone_index = fs.read_bone_index()?;
    let limits = if fs.s.read_i8()? == 1 {
        Some((fs.s.read_vec3()?, fs.s.read_vec3()?))
    } else {
        None
    };
    Ok(IkLink { bone_index, limits })
}

fn load_morph<R: Read>(fs: &mut PmxStream<R>) -> Result<Morph> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;
    let panel = fs.s.read_i8()?;
    let kind = fs.s.read_i8()?;

    let count = fs.read_count()?;
    let offsets = match kind {
        0 => {
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(GroupMorphOffset {
                    morph_index: fs.read_morph_index()?,
                    factor: fs.s.read_f32()?,
                });
            }
            MorphOffsets::Group(offsets)
        }
        1 => {
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(VertexMorphOffset {
                    vertex_index: fs.read_vertex_index()?,
                    offset: fs.s.read_vec3()?,
                });
            }
            MorphOffsets::Vertex(offsets)
        }
        2 => {
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                let bone_index = fs.read_bone_index()?;
                let translation = fs.s.read_vec3()?;
                let raw = fs.s.read_vec4()?;
                // 全零四元数归一化为单位旋转
                let rotation = if raw == glam::Vec4::ZERO {
                    glam::Quat::IDENTITY
                } else {
                    glam::Quat::from_xyzw(raw.x, raw.y, raw.z, raw.w)
                };
                offsets.push(BoneMorphOffset {
                    bone_index,
                    translation,
                    rotation,
                });
            }
            MorphOffsets::Bone(offsets)
        }
        3..=7 => {
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(UvMorphOffset {
                    vertex_index: fs.read_vertex_index()?,
                    offset: fs.s.read_vec4()?,
                });
            }
            MorphOffsets::Uv {
                channel: (kind - 3) as u8,
                offsets,
            }
        }
        8 => {
            let mut offsets = Vec::with_capacity(count);
            for _ in 0..count {
                offsets.push(MaterialMorphOffset {
                    material_index: fs.read_material_index()?,
                    operation: fs.s.read_i8()?,
                    diffuse: fs.s.read_vec4()?,
                    specular: fs.s.read_vec3()?,
                    specular_scale: fs.s.read_f32()?,
                    ambient: fs.s.read_vec3()?,
                    edge_color: fs.s.read_vec4()?,
                    edge_size: fs.s.read_f32()?,
                    texture_tint: fs.s.read_vec4()?,
                    sphere_tint: fs.s.read_vec4()?,
                    toon_tint: fs.s.read_vec4()?,
                });
            }
            MorphOffsets::Material(offsets)
        }
        _ => {
            return Err(MmdError::PmxParse(format!("unknown morph type: {}", kind)));
        }
    };

    Ok(Morph {
        name,
        name_en,
        panel,
        offsets,
    })
}

fn load_display_frame<R: Read>(fs: &mut PmxStream<R>) -> Result<DisplayFrame> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;
    let is_special = fs.s.read_u8()? == 1;

    let count = fs.read_count()?;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = match fs.s.read_u8()? {
            0 => DisplayEntry::Bone(fs.read_bone_index()?),
            1 => DisplayEntry::Morph(fs.read_morph_index()?),
            kind => {
                return Err(MmdError::PmxParse(format!(
                    "invalid display entry type: {}",
                    kind
                )));
            }
        };
        entries.push(entry);
    }

    Ok(DisplayFrame {
        name,
        name_en,
        is_special,
        entries,
    })
}

fn load_rigid<R: Read>(fs: &mut PmxStream<R>) -> Result<Rigid> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;

    let bone_index = match fs.read_bone_index()? {
        -1 => None,
        index => Some(index),
    };

    Ok(Rigid {
        name,
        name_en,
        bone_index,
        collision_group: fs.s.read_i8()?,
        collision_mask: fs.s.read_u16()?,
        shape: fs.s.read_i8()?,
        size: fs.s.read_vec3()?,
        location: fs.s.read_vec3()?,
        rotation: fs.s.read_vec3()?,
        mass: fs.s.read_f32()?,
        linear_damping: fs.s.read_f32()?,
        angular_damping: fs.s.read_f32()?,
        restitution: fs.s.read_f32()?,
        friction: fs.s.read_f32()?,
        mode: fs.s.read_i8()?,
    })
}

fn load_joint<R: Read>(fs: &mut PmxStream<R>) -> Result<Joint> {
    let name = fs.read_str()?;
    let name_en = fs.read_str()?;
    let mode = fs.s.read_i8()?;

    let rigid_a = fs.read_rigid_index()?;
    let rigid_b = fs.read_rigid_index()?;

    let mut joint = Joint {
        name,
        name_en,
        mode,
        rigid_a: if rigid_a == -1 { None } else { Some(rigid_a) },
        rigid_b: if rigid_b == -1 { None } else { Some(rigid_b) },
        location: glam::Vec3::ZERO,
        rotation: glam::Vec3::ZERO,
        location_min: glam::Vec3::ZERO,
        location_max: glam::Vec3::ZERO,
        rotation_min: glam::Vec3::ZERO,
        rotation_max: glam::Vec3::ZERO,
        spring_location: glam::Vec3::ZERO,
        spring_rotation: glam::Vec3::ZERO,
    };

    // 两个刚体引用已读出后，末尾记录截断可容忍，其余字段保持零
    match load_joint_vectors(fs, &mut joint) {
        Ok(()) => {}
        Err(e) if is_unexpected_eof(&e) => {
            log::debug!("truncated joint record, remaining fields defaulted");
        }
        Err(e) => return Err(e),
    }

    Ok(joint)
}

fn load_joint_vectors<R: Read>(fs: &mut PmxStream<R>, joint: &mut Joint) -> Result<()> {
    joint.location = fs.s.read_vec3()?;
    joint.rotation = fs.s.read_vec3()?;
    joint.location_min = fs.s.read_vec3()?;
    joint.location_max = fs.s.read_vec3()?;
    joint.rotation_min = fs.s.read_vec3()?;
    joint.rotation_max = fs.s.read_vec3()?;
    joint.spring_location = fs.s.read_vec3()?;
    joint.spring_rotation = fs.s.read_vec3()?;
    Ok(())
}

/// 交叉引用检查：索引必须指向目标集合内的实体或显式 none（-1）
fn validate(model: &Model) -> Result<()> {
    let bone_len = model.bones.len();
    let vertex_len = model.vertices.len();
    let texture_len = model.textures.len();
    let morph_len = model.morphs.len();
    let material_len = model.materials.len();
    let rigid_len = model.rigids.len();

    for vertex in &model.vertices {
        match &vertex.weight {
            BoneWeight::Bdef1 { bone } => check_index("bone", *bone, bone_len)?,
            BoneWeight::Bdef2 { bones, .. } | BoneWeight::Sdef { bones, .. } => {
                for &bone in bones {
                    check_index("bone", bone, bone_len)?;
                }
            }
            BoneWeight::Bdef4 { bones, .. } => {
                for &bone in bones {
                    check_index("bone", bone, bone_len)?;
                }
            }
        }
    }

    for face in &model.faces {
        for &vertex in face {
            if vertex as usize >= vertex_len {
                return Err(MmdError::IndexRange {
                    kind: "vertex",
                    index: vertex as i32,
                    len: vertex_len,
                });
            }
        }
    }

    for material in &model.materials {
        check_index("texture", material.texture_index, texture_len)?;
        check_index("texture", material.sphere_texture_index, texture_len)?;
        if let Toon::Texture(index) = material.toon {
            check_index("texture", index, texture_len)?;
        }
    }

    for bone in &model.bones {
        check_index("bone", bone.parent_index, bone_len)?;
        if let DisplayConnection::Bone(index) = bone.display_connection {
            check_index("bone", index, bone_len)?;
        }
        if let Some(grant) = &bone.grant {
            check_index("bone", grant.parent_index, bone_len)?;
        }
        if let Some(ik) = &bone.ik {
            check_index("bone", ik.target_bone, bone_len)?;
            for link in &ik.links {
                check_index("bone", link.bone_index, bone_len)?;
            }
        }
    }

    for morph in &model.morphs {
        match &morph.offsets {
            MorphOffsets::Group(offsets) => {
                for offset in offsets {
                    check_index("morph", offset.morph_index, morph_len)?;
                }
            }
            MorphOffsets::Vertex(offsets) => {
                for offset in offsets {
                    if offset.vertex_index as usize >= vertex_len {
                        return Err(MmdError::IndexRange {
                            kind: "vertex",
                            index: offset.vertex_index as i32,
                            len: vertex_len,
                        });
                    }
                }
            }
            MorphOffsets::Bone(offsets) => {
                for offset in offsets {
                    check_index("bone", offset.bone_index, bone_len)?;
                }
            }
            MorphOffsets::Uv { offsets, .. } => {
                for offset in offsets {
                    if offset.vertex_index as usize >= vertex_len {
                        return Err(MmdError::IndexRange {
                            kind: "vertex",
                            index: offset.vertex_index as i32,
                            len: vertex_len,
                        });
                    }
                }
            }
            MorphOffsets::Material(offsets) => {
                // -1 表示作用于全部材质
                for offset in offsets {
                    check_index("material", offset.material_index, material_len)?;
                }
            }
        }
    }

    for frame in &model.display_frames {
        for entry in &frame.entries {
            match *entry {
                DisplayEntry::Bone(index) => check_index("bone", index, bone_len)?,
                DisplayEntry::Morph(index) => check_index("morph", index, morph_len)?,
            }
        }
    }

    for rigid in &model.rigids {
        if let Some(index) = rigid.bone_index {
            check_index("bone", index, bone_len)?;
        }
    }

    for joint in &model.joints {
        if let Some(index) = joint.rigid_a {
            check_index("rigid", index, rigid_len)?;
        }
        if let Some(index) = joint.rigid_b {
            check_index("rigid", index, rigid_len)?;
        }
    }

    Ok(())
}

fn check_index(kind: &'static str, index: i32, len: usize) -> Result<()> {
    if index < -1 || (index >= 0 && index as usize >= len) {
        return Err(MmdError::IndexRange { kind, index, len });
    }
    Ok(())
}
