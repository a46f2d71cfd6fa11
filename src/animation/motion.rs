//! Motion 驱动
//!
//! 把 VMD 骨骼轨道绑定到骨架：每轨道关键帧按帧号升序排序并链接后继，
//! 游标随帧推进。每步对所有轨道求值并写入骨骼 delta。

use crate::skeleton::BoneManager;
use crate::{MmdError, Result};

use super::bezier::BezierCache;
use super::keyframe::BoneMotionKey;
use super::vmd_file::VmdFile;

/// 单骨骼轨道
#[derive(Clone, Debug)]
struct BoneTrack {
    bone_index: usize,
    keys: Vec<BoneMotionKey>,
    /// 当前关键帧游标
    current: usize,
}

impl BoneTrack {
    /// 对当前帧求值，写入骨骼 delta，并按需要推进游标
    fn step(&mut self, frame: u32, bones: &mut BoneManager, cache: &mut BezierCache) {
        let cur = &self.keys[self.current];

        let Some(next_index) = cur.next else {
            // 无后继：保持字面值
            if let Some(bone) = bones.get_bone_mut(self.bone_index) {
                bone.translate(cur.translation);
                bone.rotate(cur.rotation);
            }
            return;
        };
        let next = &self.keys[next_index];

        let linear_rate = cur.linear_rate(next, frame);

        // 首个关键帧帧号大于当前帧：保持当前关键帧字面值
        if linear_rate < 0.0 {
            if let Some(bone) = bones.get_bone_mut(self.bone_index) {
                bone.translate(cur.translation);
                bone.rotate(cur.rotation);
            }
            return;
        }

        // 跳帧越过该段：换到后继，本步不混合
        if linear_rate > 1.0 {
            self.current = next_index;
            return;
        }

        let translation = cur.interp_translation(next, linear_rate, cache);
        let rotation = cur.interp_rotation(next, linear_rate, cache);
        if let Some(bone) = bones.get_bone_mut(self.bone_index) {
            bone.translate(translation);
            bone.rotate(rotation);
        }

        if next.frame_number <= frame {
            self.current = next_index;
        }
    }

    fn finished(&self) -> bool {
        self.keys[self.current].next.is_none()
    }
}

/// 绑定到某个骨架的动画
#[derive(Clone, Default)]
pub struct Motion {
    tracks: Vec<BoneTrack>,
    pub current_frame: u32,
    cache: BezierCache,
}

impl Motion {
    /// 按名称把 VMD 骨骼轨道绑定到骨架
    ///
    /// 轨道引用不存在的骨骼时报错（解码层保证索引有效的同一原则）。
    pub fn new(bones: &BoneManager, vmd: &VmdFile) -> Result<Self> {
        let mut tracks = Vec::with_capacity(vmd.bone_animation.len());

        for (name, frame_keys) in &vmd.bone_animation {
            if frame_keys.is_empty() {
                continue;
            }
            let bone_index = bones.find_bone_by_name(name).ok_or_else(|| {
                MmdError::Animation(format!("motion references unknown bone: {}", name))
            })?;

            let mut keys: Vec<BoneMotionKey> = frame_keys
                .iter()
                .map(BoneMotionKey::from_frame_key)
                .collect();
            // 文件内帧号不保证有序
            keys.sort_by_key(|key| key.frame_number);
            for i in 0..keys.len() - 1 {
                keys[i].next = Some(i + 1);
            }

            tracks.push(BoneTrack {
                bone_index,
                keys,
                current: 0,
            });
        }

        Ok(Self {
            tracks,
            current_frame: 0,
            cache: BezierCache::new(),
        })
    }

    /// 推进一帧：对全部轨道求值后帧计数加一
    pub fn step(&mut self, bones: &mut BoneManager) {
        for track in &mut self.tracks {
            track.step(self.current_frame, bones, &mut self.cache);
        }
        self.current_frame += 1;
    }

    /// 所有轨道的当前关键帧都无后继时动画结束
    pub fn finished(&self) -> bool {
        self.tracks.iter().all(BoneTrack::finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pmx;
    use glam::{Quat, Vec3};

    fn single_bone_manager(name: &str) -> BoneManager {
        let data = vec![pmx::Bone {
            name: name.to_string(),
            name_en: String::new(),
            location: Vec3::ZERO,
            parent_index: -1,
            transform_order: 0,
            flags: pmx::BoneFlags::ROTATABLE | pmx::BoneFlags::MOVABLE,
            display_connection: pmx::DisplayConnection::Offset(Vec3::ZERO),
            grant: None,
            fixed_axis: None,
            local_axes: None,
            outside_parent_key: None,
            ik: None,
        }];
        BoneManager::from_pmx(&data)
    }

    fn vmd_with_keys(name: &str, keys: &[(u32, [f32; 3], Quat)]) -> VmdFile {
        let mut vmd = VmdFile::default();
        // 默认对角控制点：缓动系数等于线性进度
        let mut interpolation = [0i8; 64];
        for i in 0..8 {
            interpolation[i] = 32;
            interpolation[i + 8] = 96;
        }
        for &(frame_number, location, rotation) in keys {
            vmd.bone_animation
                .entry(name.to_string())
                .or_default()
                .push(crate::animation::BoneFrameKey {
                    frame_number,
                    location: Vec3::from_array(location),
                    rotation,
                    interpolation,
                });
        }
        vmd
    }

    #[test]
    fn unknown_bone_name_is_an_error() {
        let bones = single_bone_manager("センター");
        let vmd = vmd_with_keys("存在しない", &[(0, [0.0; 3], Quat::IDENTITY)]);
        assert!(matches!(
            Motion::new(&bones, &vmd),
            Err(MmdError::Animation(_))
        ));
    }

    #[test]
    fn keys_are_sorted_and_linked() {
        let bones = single_bone_manager("センター");
        let vmd = vmd_with_keys(
            "センター",
            &[
                (30, [0.0, 1.0, 0.0], Quat::IDENTITY),
                (0, [0.0, 0.0, 0.0], Quat::IDENTITY),
                (15, [0.0, 0.5, 0.0], Quat::IDENTITY),
            ],
        );
        let motion = Motion::new(&bones, &vmd).unwrap();
        let track = &motion.tracks[0];
        let frames: Vec<u32> = track.keys.iter().map(|k| k.frame_number).collect();
        assert_eq!(frames, vec![0, 15, 30]);
        assert_eq!(track.keys[0].next, Some(1));
        assert_eq!(track.keys[1].next, Some(2));
        assert_eq!(track.keys[2].next, None);
    }

    #[test]
    fn halfway_frame_blends_translation_and_rotation() {
        let mut bones = single_bone_manager("センター");
        let quarter_turn = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let vmd = vmd_with_keys(
            "センター",
            &[
                (0, [0.0, 0.0, 0.0], Quat::IDENTITY),
                (30, [0.0, 10.0, 0.0], quarter_turn),
            ],
        );
        let mut motion = Motion::new(&bones, &vmd).unwrap();

        // 帧 0..=15 逐帧推进并应用
        for _ in 0..=15 {
            motion.step(&mut bones);
            bones.update_pose();
        }

        let (_, rotation, translation) = bones
            .get_bone(0)
            .unwrap()
            .global_matrix
            .to_scale_rotation_translation();
        assert!(translation.abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-3));
        let expected = Quat::IDENTITY.slerp(quarter_turn, 0.5);
        assert!(
            rotation.abs_diff_eq(expected, 1e-3) || rotation.abs_diff_eq(-expected, 1e-3),
            "rotation {:?} != {:?}",
            rotation,
            expected
        );
    }

    #[test]
    fn early_first_key_holds_literal_values() {
        let mut bones = single_bone_manager("センター");
        // 首关键帧在第 10 帧：之前的帧保持其字面值
        let vmd = vmd_with_keys(
            "センター",
            &[
                (10, [0.0, 3.0, 0.0], Quat::IDENTITY),
                (20, [0.0, 9.0, 0.0], Quat::IDENTITY),
            ],
        );
        let mut motion = Motion::new(&bones, &vmd).unwrap();

        motion.step(&mut bones); // 帧 0
        bones.update_pose();

        let translation = bones.get_bone(0).unwrap().global_position();
        assert!(translation.abs_diff_eq(Vec3::new(0.0, 3.0, 0.0), 1e-4));
        assert!(!motion.finished());
    }

    #[test]
    fn skipped_segment_advances_without_blending() {
        let mut bones = single_bone_manager("センター");
        let vmd = vmd_with_keys(
            "センター",
            &[
                (0, [0.0, 0.0, 0.0], Quat::IDENTITY),
                (2, [0.0, 1.0, 0.0], Quat::IDENTITY),
                (100, [0.0, 2.0, 0.0], Quat::IDENTITY),
            ],
        );
        let mut motion = Motion::new(&bones, &vmd).unwrap();
        // 人为跳帧：直接从第 50 帧查询
        motion.current_frame = 50;

        motion.step(&mut bones); // linear_rate > 1，换到后继，不混合
        bones.update_pose();
        assert!(bones
            .get_bone(0)
            .unwrap()
            .global_position()
            .abs_diff_eq(Vec3::ZERO, 1e-6));
        assert_eq!(motion.tracks[0].current, 1);

        motion.step(&mut bones); // 现在在 2..100 段内正常混合
        bones.update_pose();
        let y = bones.get_bone(0).unwrap().global_position().y;
        assert!(y > 1.0 && y < 2.0, "y = {}", y);
    }

    #[test]
    fn finished_after_last_key() {
        let mut bones = single_bone_manager("センター");
        let vmd = vmd_with_keys("センター", &[(0, [0.0, 1.0, 0.0], Quat::IDENTITY)]);
        let mut motion = Motion::new(&bones, &vmd).unwrap();
        assert!(motion.finished()); // 单关键帧轨道从一开始就无后继

        motion.step(&mut bones);
        bones.update_pose();
        // 终端关键帧保持字面值
        assert!(bones
            .get_bone(0)
            .unwrap()
            .global_position()
            .abs_diff_eq(Vec3::new(0.0, 1.0, 0.0), 1e-5));
    }
}
