//! 骨骼层级与变换计算

mod bone;
mod ik_solver;
mod manager;

pub use bone::{Bone, GrantBinding, HingeLimit, KNEE_BONE_NAME};
pub use ik_solver::{IK_BIAS, IK_LOOP_RANGE};
pub use manager::BoneManager;
