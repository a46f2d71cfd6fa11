//! PMX 数据结构定义
//!
//! 解析结果的值树。解析完成后不可变。

use bitflags::bitflags;
use glam::{Quat, Vec2, Vec3, Vec4};

pub const PMX_SIGNATURE: [u8; 4] = *b"PMX ";
pub const PMX_VERSION: f32 = 2.0;

/// 字符串编码选择（头部字节 0 = UTF-16LE，其他 = UTF-8）
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextEncoding {
    Utf16Le,
    Utf8,
}

/// 文件头
#[derive(Clone, Debug)]
pub struct Header {
    pub signature: [u8; 4],
    pub version: f32,
    pub encoding: TextEncoding,
    pub additional_uvs: u8,
    pub vertex_index_size: u8,
    pub texture_index_size: u8,
    pub material_index_size: u8,
    pub bone_index_size: u8,
    pub morph_index_size: u8,
    pub rigid_index_size: u8,
}

/// 顶点骨骼权重
#[derive(Clone, Debug)]
pub enum BoneWeight {
    Bdef1 {
        bone: i32,
    },
    Bdef2 {
        bones: [i32; 2],
        weight: f32,
    },
    Bdef4 {
        bones: [i32; 4],
        weights: [f32; 4],
    },
    Sdef {
        bones: [i32; 2],
        weight: f32,
        c: Vec3,
        r0: Vec3,
        r1: Vec3,
    },
}

/// 顶点
#[derive(Clone, Debug)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub additional_uvs: Vec<Vec4>,
    pub weight: BoneWeight,
    pub edge_scale: f32,
}

bitflags! {
    /// 材质绘制标志（5 位）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MaterialFlags: u8 {
        const DOUBLE_SIDED    = 1 << 0;
        const DROP_SHADOW     = 1 << 1;
        const SELF_SHADOW_MAP = 1 << 2;
        const SELF_SHADOW     = 1 << 3;
        const TOON_EDGE       = 1 << 4;
    }
}

/// Toon 纹理引用
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Toon {
    /// 共享 toon 纹理编号（文件内 0 起，名称为 1 起）
    Shared(i8),
    /// 自定义 toon 纹理索引
    Texture(i32),
}

/// 材质
#[derive(Clone, Debug)]
pub struct Material {
    pub name: String,
    pub name_en: String,
    pub diffuse: Vec4,
    pub specular_color: Vec3,
    pub specular_scale: f32,
    pub ambient_color: Vec3,
    pub flags: MaterialFlags,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_index: i32,
    pub sphere_texture_index: i32,
    pub sphere_texture_mode: u8,
    pub toon: Toon,
    pub comment: String,
    /// 材质覆盖的面顶点数（3 的倍数）
    pub face_vertex_count: i32,
}

bitflags! {
    /// 骨骼标志（14 位）
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct BoneFlags: u16 {
        const CONNECT_TO_BONE   = 1 << 0;
        const ROTATABLE         = 1 << 1;
        const MOVABLE           = 1 << 2;
        const VISIBLE           = 1 << 3;
        const CONTROLLABLE      = 1 << 4;
        const IK                = 1 << 5;
        const GRANT_TRANSLATION = 1 << 8;
        const GRANT_ROTATION    = 1 << 9;
        const FIXED_AXIS        = 1 << 10;
        const LOCAL_AXIS        = 1 << 11;
        const AFTER_PHYSICS     = 1 << 12;
        const EXTERNAL_PARENT   = 1 << 13;
    }
}

/// 骨骼末端显示方式
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DisplayConnection {
    Bone(i32),
    Offset(Vec3),
}

/// 附加变换（グラント）：跟随另一骨骼的平移或旋转
#[derive(Clone, Copy, Debug)]
pub struct Grant {
    pub parent_index: i32,
    pub rate: f32,
}

/// IK 链接
#[derive(Clone, Debug)]
pub struct IkLink {
    pub bone_index: i32,
    /// (最小角, 最大角)
    pub limits: Option<(Vec3, Vec3)>,
}

/// IK 配置
#[derive(Clone, Debug)]
pub struct Ik {
    pub target_bone: i32,
    pub iterations: i32,
    pub limit_radius: f32,
    pub links: Vec<IkLink>,
}

/// 骨骼
#[derive(Clone, Debug)]
pub struct Bone {
    pub name: String,
    pub name_en: String,
    pub location: Vec3,
    pub parent_index: i32,
    pub transform_order: i32,
    pub flags: BoneFlags,
    pub display_connection: DisplayConnection,
    pub grant: Option<Grant>,
    pub fixed_axis: Option<Vec3>,
    /// (本地 X 轴, 本地 Z 轴)
    pub local_axes: Option<(Vec3, Vec3)>,
    pub outside_parent_key: Option<i32>,
    pub ik: Option<Ik>,
}

impl Bone {
    pub fn is_rotatable(&self) -> bool {
        self.flags.contains(BoneFlags::ROTATABLE)
    }

    pub fn is_movable(&self) -> bool {
        self.flags.contains(BoneFlags::MOVABLE)
    }

    pub fn is_visible(&self) -> bool {
        self.flags.contains(BoneFlags::VISIBLE)
    }

    pub fn is_controllable(&self) -> bool {
        self.flags.contains(BoneFlags::CONTROLLABLE)
    }

    pub fn is_ik(&self) -> bool {
        self.flags.contains(BoneFlags::IK)
    }

    pub fn has_grant_translation(&self) -> bool {
        self.flags.contains(BoneFlags::GRANT_TRANSLATION)
    }

    pub fn has_grant_rotation(&self) -> bool {
        self.flags.contains(BoneFlags::GRANT_ROTATION)
    }

    pub fn transform_after_physics(&self) -> bool {
        self.flags.contains(BoneFlags::AFTER_PHYSICS)
    }
}

/// 组 Morph 偏移
#[derive(Clone, Copy, Debug)]
pub struct GroupMorphOffset {
    pub morph_index: i32,
    pub factor: f32,
}

/// 顶点 Morph 偏移
#[derive(Clone, Copy, Debug)]
pub struct VertexMorphOffset {
    pub vertex_index: u32,
    pub offset: Vec3,
}

/// 骨骼 Morph 偏移
#[derive(Clone, Copy, Debug)]
pub struct BoneMorphOffset {
    pub bone_index: i32,
    pub translation: Vec3,
    pub rotation: Quat,
}

/// UV Morph 偏移
#[derive(Clone, Copy, Debug)]
pub struct UvMorphOffset {
    pub vertex_index: u32,
    pub offset: Vec4,
}

/// 材质 Morph 偏移
#[derive(Clone, Copy, Debug)]
pub struct MaterialMorphOffset {
    /// -1 表示作用于全部材质
    pub material_index: i32,
    pub operation: i8,
    pub diffuse: Vec4,
    pub specular: Vec3,
    pub specular_scale: f32,
    pub ambient: Vec3,
    pub edge_color: Vec4,
    pub edge_size: f32,
    pub texture_tint: Vec4,
    pub sphere_tint: Vec4,
    pub toon_tint: Vec4,
}

/// Morph 偏移列表（按类型标签区分）
#[derive(Clone, Debug)]
pub enum MorphOffsets {
    Group(Vec<GroupMorphOffset>),
    Vertex(Vec<VertexMorphOffset>),
    Bone(Vec<BoneMorphOffset>),
    Uv {
        /// 0 = 基础 UV，1..4 = 附加 UV 通道
        channel: u8,
        offsets: Vec<UvMorphOffset>,
    },
    Material(Vec<MaterialMorphOffset>),
}

/// Morph
#[derive(Clone, Debug)]
pub struct Morph {
    pub name: String,
    pub name_en: String,
    pub panel: i8,
    pub offsets: MorphOffsets,
}

/// 显示枠条目
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DisplayEntry {
    Bone(i32),
    Morph(i32),
}

/// 显示枠
#[derive(Clone, Debug)]
pub struct DisplayFrame {
    pub name: String,
    pub name_en: String,
    pub is_special: bool,
    pub entries: Vec<DisplayEntry>,
}

/// 刚体（仅解析，不参与模拟）
#[derive(Clone, Debug)]
pub struct Rigid {
    pub name: String,
    pub name_en: String,
    pub bone_index: Option<i32>,
    pub collision_group: i8,
    pub collision_mask: u16,
    pub shape: i8,
    pub size: Vec3,
    pub location: Vec3,
    pub rotation: Vec3,
    pub mass: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub restitution: f32,
    pub friction: f32,
    pub mode: i8,
}

/// 关节（仅解析，不参与模拟）
#[derive(Clone, Debug)]
pub struct Joint {
    pub name: String,
    pub name_en: String,
    pub mode: i8,
    pub rigid_a: Option<i32>,
    pub rigid_b: Option<i32>,
    pub location: Vec3,
    pub rotation: Vec3,
    pub location_min: Vec3,
    pub location_max: Vec3,
    pub rotation_min: Vec3,
    pub rotation_max: Vec3,
    pub spring_location: Vec3,
    pub spring_rotation: Vec3,
}

/// 模型值树
#[derive(Clone, Debug)]
pub struct Model {
    pub header: Header,
    pub name: String,
    pub name_en: String,
    pub comment: String,
    pub comment_en: String,
    pub vertices: Vec<Vertex>,
    pub faces: Vec<[u32; 3]>,
    pub textures: Vec<String>,
    pub materials: Vec<Material>,
    pub bones: Vec<Bone>,
    pub morphs: Vec<Morph>,
    pub display_frames: Vec<DisplayFrame>,
    pub rigids: Vec<Rigid>,
    pub joints: Vec<Joint>,
}

impl Model {
    /// 预置两个特殊显示枠（Root / 表情），文件内容追加其后
    pub(crate) fn seed_display_frames() -> Vec<DisplayFrame> {
        vec![
            DisplayFrame {
                name: "Root".to_string(),
                name_en: "Root".to_string(),
                is_special: true,
                entries: Vec::new(),
            },
            DisplayFrame {
                name: "表情".to_string(),
                name_en: "Facial".to_string(),
                is_special: true,
                entries: Vec::new(),
            },
        ]
    }
}
