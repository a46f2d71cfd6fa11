//! 骨骼节点
//!
//! 常量矩阵在构建时确定：init（绑定位置平移）、offset（其逆）、
//! part（父骨骼 offset × 自身 init）。每步动画只改写 delta，
//! apply 阶段折叠进 global/local。

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::pmx;

/// 膝骨骼保留名：IK 中限制为单向弯曲
pub const KNEE_BONE_NAME: &str = "ひざ";

/// 铰链式关节限制（IK 应用旋转前检查候补矩阵）
#[derive(Clone, Copy, Debug)]
pub struct HingeLimit {
    pub threshold: f32,
}

impl Default for HingeLimit {
    fn default() -> Self {
        Self { threshold: 0.02 }
    }
}

/// 附加变换绑定
#[derive(Clone, Copy, Debug)]
pub struct GrantBinding {
    pub parent: usize,
    pub rate: f32,
    pub is_translation: bool,
}

/// 运行时骨骼节点（扁平数组存放，交叉引用为索引）
#[derive(Clone, Debug)]
pub struct Bone {
    pub index: usize,
    pub name: String,
    pub name_en: String,
    /// 变换层级（transform order）
    pub level: i32,

    /// 绑定位置平移（常量）
    pub init_matrix: Mat4,
    /// 逆绑定矩阵（常量）
    pub offset_matrix: Mat4,
    /// part = parent.offset × init（父骨骼确定后计算，常量）
    pub part_matrix: Mat4,

    /// 每步重置为单位阵，累积该步的编辑
    pub delta_matrix: Mat4,
    /// 累积世界变换
    pub global_matrix: Mat4,
    /// 蒙皮矩阵 = global × offset
    pub local_matrix: Mat4,

    pub parent: Option<usize>,

    pub is_rotatable: bool,
    pub is_movable: bool,
    pub is_visible: bool,
    pub is_controllable: bool,

    pub is_ik: bool,
    pub ik_effect_bone: Option<usize>,
    pub ik_iterations: i32,
    pub ik_links: Vec<usize>,

    pub grant: Option<GrantBinding>,
    pub hinge: Option<HingeLimit>,

    pub(crate) is_updated: bool,
}

impl Bone {
    /// 第一遍构建：交叉引用（parent/IK/grant）留待第二遍解析
    pub fn new(index: usize, data: &pmx::Bone) -> Self {
        let init_matrix = Mat4::from_translation(data.location);
        let hinge = if data.name == KNEE_BONE_NAME {
            Some(HingeLimit::default())
        } else {
            None
        };

        Self {
            index,
            name: data.name.clone(),
            name_en: data.name_en.clone(),
            level: data.transform_order,
            init_matrix,
            offset_matrix: init_matrix.inverse(),
            part_matrix: Mat4::IDENTITY,
            delta_matrix: Mat4::IDENTITY,
            global_matrix: init_matrix,
            local_matrix: Mat4::IDENTITY,
            parent: None,
            is_rotatable: data.is_rotatable(),
            is_movable: data.is_movable(),
            is_visible: data.is_visible(),
            is_controllable: data.is_controllable(),
            is_ik: data.is_ik(),
            ik_effect_bone: None,
            ik_iterations: 0,
            ik_links: Vec::new(),
            grant: None,
            hinge,
            is_updated: false,
        }
    }

    /// 回到绑定姿态
    pub fn reset(&mut self) {
        self.global_matrix = self.init_matrix;
        self.delta_matrix = Mat4::IDENTITY;
        self.local_matrix = Mat4::IDENTITY;
    }

    /// 为下一步清空 delta
    pub fn reset_delta(&mut self) {
        self.delta_matrix = Mat4::IDENTITY;
    }

    /// 向 delta 追加一个部分变换（后追加的先作用）
    pub fn add_matrix(&mut self, matrix: Mat4) {
        self.delta_matrix *= matrix;
    }

    pub fn translate(&mut self, translation: Vec3) {
        self.add_matrix(Mat4::from_translation(translation));
    }

    pub fn rotate(&mut self, rotation: Quat) {
        self.add_matrix(Mat4::from_quat(rotation));
    }

    /// 绕轴旋转的候补矩阵
    pub fn axis_rotation(axis: Vec3, angle: f32) -> Mat4 {
        Mat4::from_axis_angle(axis, angle)
    }

    /// 从 delta 提取旋转向量（轴 × 角）
    pub fn rotation_vector(&self) -> Vec3 {
        let (axis, angle) = Quat::from_mat4(&self.delta_matrix).to_axis_angle();
        if angle.abs() < f32::EPSILON {
            Vec3::ZERO
        } else {
            axis * angle
        }
    }

    /// 以旋转向量形式向 delta 追加旋转
    pub fn set_rotation(&mut self, rotation: Vec3) {
        let angle = rotation.length();
        if angle > f32::EPSILON {
            self.add_matrix(Mat4::from_axis_angle(rotation / angle, angle));
        }
    }

    /// 存储的 global 矩阵中的平移分量
    pub fn global_position(&self) -> Vec3 {
        self.global_matrix.w_axis.truncate()
    }

    pub fn set_global_position(&mut self, position: Vec3) {
        let w = self.global_matrix.w_axis.w;
        self.global_matrix.w_axis = Vec4::new(position.x, position.y, position.z, w);
    }

    /// 蒙皮矩阵
    pub fn skinning_matrix(&self) -> Mat4 {
        self.global_matrix * self.offset_matrix
    }
}
