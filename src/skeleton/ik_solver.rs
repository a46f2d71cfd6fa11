//! CCD IK 求解
//!
//! 逐链节迭代：把目标与效果器末端变换到链节本地系，归一化后由
//! 点积求夹角，绕叉积轴旋转链节的 delta。任一链节收敛即终止整次求解。

use glam::Vec3;

use super::bone::Bone;
use super::manager::BoneManager;

/// 收敛容差（弧度代理量）
pub const IK_BIAS: f32 = 1e-2;

/// 迭代次数绝对上限
pub const IK_LOOP_RANGE: i32 = 256;

/// 带极小量保护的归一化（零向量不产生 NaN）
fn normalize(v: Vec3) -> Vec3 {
    v / (v.length() + 1e-32)
}

impl BoneManager {
    /// 求解一条 IK 链
    ///
    /// `effect` 为效果器末端骨骼，`target_position` 为世界系目标位置，
    /// `chain` 为按顺序排列的链节骨骼。只改写链节的 delta 矩阵；
    /// 调用方随后重新读取全局矩阵。数值退化（平行向量、零长链）时
    /// 提前收敛而不报错。
    pub fn ik_move(&mut self, effect: usize, target_position: Vec3, chain: &[usize], loop_size: i32) {
        let loop_size = loop_size.clamp(0, IK_LOOP_RANGE) as usize;

        for &chain_bone in chain {
            let mut exit_flag = false;
            for _ in 0..loop_size {
                let base = self.global_matrix(chain_bone, false).inverse();

                let local_target = normalize(base.transform_point3(target_position));
                let effect_position = self.global_matrix(effect, false).w_axis.truncate();
                let local_effect = normalize(base.transform_point3(effect_position));

                let dot = local_effect.dot(local_target).clamp(-1.0, 1.0);
                let angle = dot.acos();
                if angle.abs() < IK_BIAS {
                    exit_flag = true;
                    break;
                }

                let axis = local_effect.cross(local_target);
                if axis.abs().element_sum() < IK_BIAS {
                    exit_flag = true;
                    break;
                }

                self.rotatable_control(chain_bone, normalize(axis), angle);
            }
            // 收敛终止整次求解，而非仅当前链节
            if exit_flag {
                break;
            }
        }
    }

    /// 应用链节旋转，受铰链限制约束
    ///
    /// 带铰链限制的骨骼先检查候补旋转矩阵的弯曲方向分量，越界时丢弃该次旋转。
    fn rotatable_control(&mut self, index: usize, axis: Vec3, angle: f32) {
        let rotation = Bone::axis_rotation(axis, angle);
        let Some(bone) = self.get_bone_mut(index) else {
            return;
        };
        match bone.hinge {
            Some(hinge) => {
                if rotation.y_axis.z < hinge.threshold {
                    bone.add_matrix(rotation);
                }
            }
            None => bone.add_matrix(rotation),
        }
    }
}
