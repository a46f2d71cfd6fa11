//! 骨骼管理器
//!
//! 两遍构建：第一遍按模型骨骼索引分配节点，第二遍解析 parent/grant/IK
//! 交叉引用（它们可能指向任意索引）。每步更新按变换层级升序先解 IK、
//! 再应用附加变换，最后自顶向下折叠 delta 并复位。

use std::collections::{BTreeMap, HashMap};

use glam::Mat4;

use crate::pmx;

use super::bone::{Bone, GrantBinding};

/// 骨骼管理器
#[derive(Clone, Default)]
pub struct BoneManager {
    bones: Vec<Bone>,
    name_to_index: HashMap<String, usize>,
    /// 变换层级 → 骨骼索引（键有序）
    levels: BTreeMap<i32, Vec<usize>>,
}

impl BoneManager {
    /// 从解码后的模型骨骼构建运行时骨架
    pub fn from_pmx(data: &[pmx::Bone]) -> Self {
        let mut manager = BoneManager::default();

        // 第一遍：分配节点
        for (index, bone_data) in data.iter().enumerate() {
            let bone = Bone::new(index, bone_data);
            manager.name_to_index.insert(bone.name.clone(), index);
            manager.levels.entry(bone.level).or_default().push(index);
            manager.bones.push(bone);
        }

        // 第二遍：解析交叉引用
        for (index, bone_data) in data.iter().enumerate() {
            // 仅接受索引小于自身的父骨骼，防御前向/循环引用
            let parent = bone_data.parent_index;
            if parent >= 0 && (parent as usize) < index {
                let parent = parent as usize;
                manager.bones[index].parent = Some(parent);
                manager.bones[index].part_matrix =
                    manager.bones[parent].offset_matrix * manager.bones[index].init_matrix;
            }

            if let Some(ik) = &bone_data.ik {
                if ik.target_bone >= 0 {
                    manager.bones[index].ik_effect_bone = Some(ik.target_bone as usize);
                }
                manager.bones[index].ik_iterations = ik.iterations;
                manager.bones[index].ik_links = ik
                    .links
                    .iter()
                    .filter(|link| link.bone_index >= 0)
                    .map(|link| link.bone_index as usize)
                    .collect();
            }

            if let Some(grant) = &bone_data.grant {
                if grant.parent_index >= 0 {
                    manager.bones[index].grant = Some(GrantBinding {
                        parent: grant.parent_index as usize,
                        rate: grant.rate,
                        is_translation: bone_data.has_grant_translation(),
                    });
                }
            }
        }

        manager
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn get_bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn get_bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    /// 通过名称查找骨骼
    pub fn find_bone_by_name(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// 计算骨骼全局矩阵：global = (parent? parent.global × part : 存储值) × delta
    ///
    /// `check_updated` 为真时命中 apply 阶段的备忘，每骨骼至多计算一次。
    pub fn global_matrix(&self, index: usize, check_updated: bool) -> Mat4 {
        let bone = &self.bones[index];
        if check_updated && bone.is_updated {
            return bone.global_matrix;
        }
        let base = match bone.parent {
            Some(parent) => self.global_matrix(parent, check_updated) * bone.part_matrix,
            None => bone.global_matrix,
        };
        base * bone.delta_matrix
    }

    /// 执行一步姿态更新
    ///
    /// 层级升序：该层的 IK 链求解、附加变换；全部层级结束后自顶向下
    /// 折叠 delta 到 global/local，随后 delta 复位为单位阵。
    pub fn update_pose(&mut self) {
        // 每步从绑定位置重建，delta 为该步的全部编辑
        for bone in &mut self.bones {
            bone.global_matrix = bone.init_matrix;
        }

        let levels: Vec<Vec<usize>> = self.levels.values().cloned().collect();
        for indices in levels {
            for index in indices {
                let bone = &self.bones[index];
                if bone.is_ik {
                    if let Some(effect) = bone.ik_effect_bone {
                        let chain = bone.ik_links.clone();
                        let iterations = bone.ik_iterations;
                        let target = self.global_matrix(index, false).w_axis.truncate();
                        self.ik_move(effect, target, &chain, iterations);
                    }
                }
                self.apply_grant(index);
            }
        }

        for bone in &mut self.bones {
            bone.is_updated = false;
        }
        for index in 0..self.bones.len() {
            self.apply(index);
            self.bones[index].reset_delta();
        }
    }

    /// 附加变换：按比率复制目标骨骼的平移或旋转
    fn apply_grant(&mut self, index: usize) {
        let Some(grant) = self.bones[index].grant else {
            return;
        };

        if grant.is_translation {
            let position = self.bones[grant.parent].global_position();
            self.bones[index].set_global_position(position * grant.rate);
        } else {
            let rotation = self.bones[grant.parent].rotation_vector();
            self.bones[index].set_rotation(rotation * grant.rate);
        }
    }

    /// 折叠 delta 到 global/local，未解析的父骨骼先递归处理
    fn apply(&mut self, index: usize) {
        if let Some(parent) = self.bones[index].parent {
            if !self.bones[parent].is_updated {
                self.apply(parent);
            }
        }
        let global = self.global_matrix(index, true);
        let bone = &mut self.bones[index];
        bone.global_matrix = global;
        bone.local_matrix = bone.skinning_matrix();
        bone.is_updated = true;
    }

    /// 全部骨骼回到绑定姿态
    pub fn reset_pose(&mut self) {
        for bone in &mut self.bones {
            bone.reset();
        }
    }

    /// 每骨骼蒙皮矩阵数组（每步重算一次）
    pub fn local_matrices(&self) -> Vec<Mat4> {
        self.bones.iter().map(|b| b.local_matrix).collect()
    }

    /// 每骨骼世界矩阵数组
    pub fn global_matrices(&self) -> Vec<Mat4> {
        self.bones.iter().map(|b| b.global_matrix).collect()
    }
}
