//! MMD 解码与姿态计算引擎
//!
//! 提供渲染器无关的核心功能：
//! - PMX 2.0 模型解析（网格/材质/骨骼/Morph/物理数据）
//! - VMD 动画解析（骨骼/表情/相机/光源/阴影/属性轨道）
//! - 骨骼层级变换与 CCD IK 求解
//! - 贝塞尔缓动关键帧插值
//! - 顶点蒙皮数据展开

pub mod animation;
pub mod io;
pub mod model;
pub mod pmx;
pub mod skeleton;
pub mod skinning;

pub use animation::{Motion, VmdFile};
pub use model::MmdModel;
pub use skeleton::{Bone, BoneManager};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MmdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("format error: {0}")]
    Format(String),

    #[error("PMX parse error: {0}")]
    PmxParse(String),

    #[error("VMD parse error: {0}")]
    VmdParse(String),

    #[error("{0} trailing bytes remain after model parse")]
    TrailingData(usize),

    #[error("{kind} index {index} out of range (len {len})")]
    IndexRange {
        kind: &'static str,
        index: i32,
        len: usize,
    },

    #[error("animation error: {0}")]
    Animation(String),
}

pub type Result<T> = std::result::Result<T, MmdError>;
