//! VMD 文件解析
//!
//! 四个必有轨道节（骨骼/表情/相机/光源）之后，自阴影与属性节可能
//! 因为旧版工具导出而整体缺失：这两节的短读按空列表恢复，其余错误照常传播。

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use glam::{Quat, Vec3};

use crate::io::{crop_null, is_unexpected_eof, ByteStream};
use crate::{MmdError, Result};

/// 固定 30 字节签名（零填充）
pub const VMD_SIGNATURE: &[u8] = b"Vocaloid Motion Data 0002";

/// 骨骼关键帧记录
#[derive(Clone, Debug)]
pub struct BoneFrameKey {
    pub frame_number: u32,
    pub location: Vec3,
    pub rotation: Quat,
    /// 64 字节插值块（16 个有效带符号值）
    pub interpolation: [i8; 64],
}

/// 表情关键帧记录
#[derive(Clone, Copy, Debug)]
pub struct ShapeKeyFrameKey {
    pub frame_number: u32,
    pub weight: f32,
}

/// 相机关键帧记录
#[derive(Clone, Copy, Debug)]
pub struct CameraKeyFrameKey {
    pub frame_number: u32,
    pub distance: f32,
    pub location: Vec3,
    pub rotation: Vec3,
    pub interpolation: [f32; 6],
    pub angle: u32,
    pub perspective: bool,
}

/// 光源关键帧记录
#[derive(Clone, Copy, Debug)]
pub struct LampKeyFrameKey {
    pub frame_number: u32,
    pub color: Vec3,
    pub direction: Vec3,
}

/// 自阴影关键帧记录
#[derive(Clone, Copy, Debug)]
pub struct SelfShadowFrameKey {
    pub frame_number: u32,
    pub mode: i8,
    /// 真实距离 = 10000 - 原始值 × 10000
    pub distance: f32,
}

/// IK 开关状态
#[derive(Clone, Debug)]
pub struct IkState {
    pub name: String,
    pub enabled: bool,
}

/// 属性关键帧记录
#[derive(Clone, Debug)]
pub struct PropertyFrameKey {
    pub frame_number: u32,
    pub visible: bool,
    pub ik_states: Vec<IkState>,
}

/// VMD 动画数据
#[derive(Clone, Debug, Default)]
pub struct VmdFile {
    pub model_name: String,
    /// 骨骼名 → 关键帧列表（保持文件内顺序，不保证按帧号排序）
    pub bone_animation: HashMap<String, Vec<BoneFrameKey>>,
    pub shape_key_animation: HashMap<String, Vec<ShapeKeyFrameKey>>,
    pub camera_animation: Vec<CameraKeyFrameKey>,
    pub lamp_animation: Vec<LampKeyFrameKey>,
    pub self_shadow_animation: Vec<SelfShadowFrameKey>,
    pub property_animation: Vec<PropertyFrameKey>,
}

impl VmdFile {
    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::parse(BufReader::new(file))
    }

    /// 从字节流解析
    pub fn parse<R: Read>(reader: R) -> Result<Self> {
        let mut s = ByteStream::new(reader);

        let mut signature = [0u8; 30];
        s.read_bytes(&mut signature)?;
        if crop_null(&signature) != VMD_SIGNATURE {
            return Err(MmdError::Format("invalid VMD signature".to_string()));
        }

        let mut name_bytes = [0u8; 20];
        s.read_bytes(&mut name_bytes)?;
        let model_name = decode_shift_jis(&name_bytes);

        let mut vmd = VmdFile {
            model_name,
            ..VmdFile::default()
        };

        // 必有节，计数为零时也存在结构
        load_bone_animation(&mut s, &mut vmd.bone_animation)?;
        load_shape_key_animation(&mut s, &mut vmd.shape_key_animation)?;
        vmd.camera_animation = load_camera_animation(&mut s)?;
        vmd.lamp_animation = load_lamp_animation(&mut s)?;

        // 可选的尾部两节
        match load_self_shadow_animation(&mut s) {
            Ok(keys) => {
                vmd.self_shadow_animation = keys;
                match load_property_animation(&mut s) {
                    Ok(keys) => vmd.property_animation = keys,
                    Err(e) if is_unexpected_eof(&e) => {
                        log::debug!("property section truncated, treated as empty");
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) if is_unexpected_eof(&e) => {
                log::debug!("self shadow section truncated, treated as empty");
            }
            Err(e) => return Err(e),
        }

        log::info!(
            "VMD parsed: {} bone tracks, {} shape tracks, {} camera keys",
            vmd.bone_animation.len(),
            vmd.shape_key_animation.len(),
            vmd.camera_animation.len(),
        );

        Ok(vmd)
    }
}

fn load_bone_animation<R: Read>(
    s: &mut ByteStream<R>,
    tracks: &mut HashMap<String, Vec<BoneFrameKey>>,
) -> Result<()> {
    let count = s.read_u32()?;
    for _ in 0..count {
        let mut name_bytes = [0u8; 15];
        s.read_bytes(&mut name_bytes)?;
        let name = decode_shift_jis(&name_bytes);

        let frame_number = s.read_u32()?;
        let location = s.read_vec3()?;
        let raw = s.read_vec4()?;
        // 全零四元数归一化为单位旋转
        let rotation = if raw == glam::Vec4::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_xyzw(raw.x, raw.y, raw.z, raw.w)
        };

        let mut interp_bytes = [0u8; 64];
        s.read_bytes(&mut interp_bytes)?;
        let mut interpolation = [0i8; 64];
        for (dst, &src) in interpolation.iter_mut().zip(interp_bytes.iter()) {
            *dst = src as i8;
        }

        // 同名记录按文件顺序追加到该名字的列表
        tracks.entry(name).or_default().push(BoneFrameKey {
            frame_number,
            location,
            rotation,
            interpolation,
        });
    }
    Ok(())
}

fn load_shape_key_animation<R: Read>(
    s: &mut ByteStream<R>,
    tracks: &mut HashMap<String, Vec<ShapeKeyFrameKey>>,
) -> Result<()> {
    let count = s.read_u32()?;
    for _ in 0..count {
        let mut name_bytes = [0u8; 15];
        s.read_bytes(&mut name_bytes)?;
        let name = decode_shift_jis(&name_bytes);

        let key = ShapeKeyFrameKey {
            frame_number: s.read_u32()?,
            weight: s.read_f32()?,
        };
        tracks.entry(name).or_default().push(key);
    }
    Ok(())
}

fn load_camera_animation<R: Read>(s: &mut ByteStream<R>) -> Result<Vec<CameraKeyFrameKey>> {
    let count = s.read_u32()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let frame_number = s.read_u32()?;
        let distance = s.read_f32()?;
        let location = s.read_vec3()?;
        let rotation = s.read_vec3()?;
        let mut interpolation = [0f32; 6];
        for v in interpolation.iter_mut() {
            *v = s.read_f32()?;
        }
        keys.push(CameraKeyFrameKey {
            frame_number,
            distance,
            location,
            rotation,
            interpolation,
            angle: s.read_u32()?,
            perspective: s.read_i8()? == 0,
        });
    }
    Ok(keys)
}

fn load_lamp_animation<R: Read>(s: &mut ByteStream<R>) -> Result<Vec<LampKeyFrameKey>> {
    let count = s.read_u32()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(LampKeyFrameKey {
            frame_number: s.read_u32()?,
            color: s.read_vec3()?,
            direction: s.read_vec3()?,
        });
    }
    Ok(keys)
}

fn load_self_shadow_animation<R: Read>(s: &mut ByteStream<R>) -> Result<Vec<SelfShadowFrameKey>> {
    let count = s.read_u32()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(SelfShadowFrameKey {
            frame_number: s.read_u32()?,
            mode: s.read_i8()?,
            distance: 10000.0 - s.read_f32()? * 10000.0,
        });
    }
    Ok(keys)
}

fn load_property_animation<R: Read>(s: &mut ByteStream<R>) -> Result<Vec<PropertyFrameKey>> {
    let count = s.read_u32()?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let frame_number = s.read_u32()?;
        let visible = s.read_i8()? != 0;

        let state_count = s.read_u32()?;
        let mut ik_states = Vec::with_capacity(state_count as usize);
        for _ in 0..state_count {
            let mut name_bytes = [0u8; 20];
            s.read_bytes(&mut name_bytes)?;
            ik_states.push(IkState {
                name: decode_shift_jis(&name_bytes),
                enabled: s.read_i8()? != 0,
            });
        }

        keys.push(PropertyFrameKey {
            frame_number,
            visible,
            ik_states,
        });
    }
    Ok(keys)
}

/// 解码 Shift-JIS 字符串（在 null 处截断）
fn decode_shift_jis(bytes: &[u8]) -> String {
    use encoding_rs::SHIFT_JIS;
    let (decoded, _, _) = SHIFT_JIS.decode(crop_null(bytes));
    decoded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::testutil::Buf;

    pub(crate) fn vmd_header(buf: &mut Buf, model_name: &str) {
        buf.padded(VMD_SIGNATURE, 30);
        buf.padded(model_name.as_bytes(), 20);
    }

    pub(crate) fn bone_key(buf: &mut Buf, name: &str, frame: u32, location: [f32; 3], rotation: [f32; 4]) {
        buf.padded(name.as_bytes(), 15);
        buf.u32(frame);
        buf.vec3(location[0], location[1], location[2]);
        buf.vec4(rotation[0], rotation[1], rotation[2], rotation[3]);
        for _ in 0..64 {
            buf.i8(0);
        }
    }

    #[test]
    fn minimal_buffer_yields_empty_tracks() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "model");
        buf.u32(0).u32(0).u32(0).u32(0); // 四个必有节，计数皆零

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        assert_eq!(vmd.model_name, "model");
        assert!(vmd.bone_animation.is_empty());
        assert!(vmd.camera_animation.is_empty());
        // 流在此结束：可选节按空恢复，不报错
        assert!(vmd.self_shadow_animation.is_empty());
        assert!(vmd.property_animation.is_empty());
    }

    #[test]
    fn bad_signature_is_format_error() {
        let mut buf = Buf::new();
        buf.padded(b"Vocaloid Motion Data 0001", 30);
        buf.padded(b"", 20);
        assert!(matches!(
            VmdFile::parse(&buf.0[..]),
            Err(crate::MmdError::Format(_))
        ));
    }

    #[test]
    fn same_name_keys_group_in_file_order() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(3);
        bone_key(&mut buf, "arm", 30, [0.0, 1.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        bone_key(&mut buf, "arm", 0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        bone_key(&mut buf, "leg", 5, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0]);
        buf.u32(0).u32(0).u32(0);

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        let arm = &vmd.bone_animation["arm"];
        assert_eq!(arm.len(), 2);
        // 文件顺序保留：帧号未排序
        assert_eq!(arm[0].frame_number, 30);
        assert_eq!(arm[1].frame_number, 0);
        assert_eq!(vmd.bone_animation["leg"].len(), 1);
    }

    #[test]
    fn zero_rotation_becomes_identity() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(1);
        bone_key(&mut buf, "c", 0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]);
        buf.u32(0).u32(0).u32(0);

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        assert_eq!(vmd.bone_animation["c"][0].rotation, Quat::IDENTITY);
    }

    #[test]
    fn truncated_self_shadow_section_is_empty() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(0).u32(0).u32(0).u32(0);
        buf.u32(2); // 自阴影计数 2 但记录中途截断
        buf.u32(0).i8(1);

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        assert!(vmd.self_shadow_animation.is_empty());
        assert!(vmd.property_animation.is_empty());
    }

    #[test]
    fn self_shadow_distance_is_transformed() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(0).u32(0).u32(0).u32(0);
        buf.u32(1);
        buf.u32(10).i8(1).f32(0.03);
        buf.u32(0); // 属性节为空

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        let key = &vmd.self_shadow_animation[0];
        assert_eq!(key.frame_number, 10);
        assert!((key.distance - 9700.0).abs() < 1e-3);
    }

    #[test]
    fn property_keys_carry_ik_states() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(0).u32(0).u32(0).u32(0);
        buf.u32(0); // 自阴影为空
        buf.u32(1);
        buf.u32(0).i8(1);
        buf.u32(2);
        buf.padded("左足ＩＫ".as_bytes(), 20); // UTF-8 字节仍以 null 截断解码
        buf.i8(1);
        buf.padded(b"right", 20);
        buf.i8(0);

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        let key = &vmd.property_animation[0];
        assert!(key.visible);
        assert_eq!(key.ik_states.len(), 2);
        assert!(key.ik_states[0].enabled);
        assert!(!key.ik_states[1].enabled);
        assert_eq!(key.ik_states[1].name, "right");
    }

    #[test]
    fn camera_and_lamp_records_parse() {
        let mut buf = Buf::new();
        vmd_header(&mut buf, "");
        buf.u32(0).u32(0);
        buf.u32(1); // 相机
        buf.u32(0).f32(-30.0);
        buf.vec3(0.0, 10.0, 0.0);
        buf.vec3(0.1, 0.0, 0.0);
        for _ in 0..6 {
            buf.f32(0.0);
        }
        buf.u32(30).i8(0);
        buf.u32(1); // 光源
        buf.u32(0);
        buf.vec3(0.6, 0.6, 0.6);
        buf.vec3(-0.5, -1.0, 0.5);

        let vmd = VmdFile::parse(&buf.0[..]).unwrap();
        let camera = &vmd.camera_animation[0];
        assert!((camera.distance + 30.0).abs() < 1e-6);
        assert_eq!(camera.angle, 30);
        assert!(camera.perspective);
        assert!((vmd.lamp_animation[0].direction.y + 1.0).abs() < 1e-6);
    }
}
