//! 骨骼动画关键帧
//!
//! 解码记录到运行时关键帧的转换：64 字节插值块重排为
//! x/y/z/旋转 四通道 × 2 控制点 × 2 坐标，各除以 127 归入单位正方形。

use glam::{Quat, Vec3};

use super::bezier::{BezierCache, BezierControl};
use super::vmd_file::BoneFrameKey;

/// 四通道插值曲线
#[derive(Clone, Copy, Debug, Default)]
pub struct BoneInterpolation {
    pub x: BezierControl,
    pub y: BezierControl,
    pub z: BezierControl,
    pub r: BezierControl,
}

impl BoneInterpolation {
    /// 从 64 字节插值块重排（仅前 16 个值有效）
    pub fn from_block(block: &[i8; 64]) -> Self {
        let v = |i: usize| block[i] as f32 / 127.0;
        let channel = |i: usize| BezierControl {
            x: [v(i), v(i + 8)],
            y: [v(i + 4), v(i + 12)],
        };
        Self {
            x: channel(0),
            y: channel(1),
            z: channel(2),
            r: channel(3),
        }
    }
}

/// 运行时骨骼关键帧（按时间单向链接，终端无后继）
#[derive(Clone, Debug)]
pub struct BoneMotionKey {
    pub frame_number: u32,
    pub translation: Vec3,
    pub rotation: Quat,
    pub curves: BoneInterpolation,
    /// 后继关键帧在轨道内的索引
    pub next: Option<usize>,
}

impl BoneMotionKey {
    pub fn from_frame_key(key: &BoneFrameKey) -> Self {
        Self {
            frame_number: key.frame_number,
            translation: key.location,
            rotation: key.rotation,
            curves: BoneInterpolation::from_block(&key.interpolation),
            next: None,
        }
    }

    /// 两关键帧之间的线性进度（帧号相同时定义为 0）
    pub fn linear_rate(&self, next: &BoneMotionKey, frame: u32) -> f32 {
        if next.frame_number == self.frame_number {
            return 0.0;
        }
        (frame as f32 - self.frame_number as f32)
            / (next.frame_number as f32 - self.frame_number as f32)
    }

    /// 平移插值：三轴各自独立缓动
    pub fn interp_translation(
        &self,
        next: &BoneMotionKey,
        linear_rate: f32,
        cache: &mut BezierCache,
    ) -> Vec3 {
        let rx = cache.solve(self.curves.x, linear_rate);
        let ry = cache.solve(self.curves.y, linear_rate);
        let rz = cache.solve(self.curves.z, linear_rate);
        Vec3::new(
            next.translation.x * rx + self.translation.x * (1.0 - rx),
            next.translation.y * ry + self.translation.y * (1.0 - ry),
            next.translation.z * rz + self.translation.z * (1.0 - rz),
        )
    }

    /// 旋转插值：缓动后的球面插值
    pub fn interp_rotation(
        &self,
        next: &BoneMotionKey,
        linear_rate: f32,
        cache: &mut BezierCache,
    ) -> Quat {
        let rate = cache.solve(self.curves.r, linear_rate);
        self.rotation.slerp(next.rotation, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_key(frame: u32, location: [f32; 3], rotation: Quat) -> BoneFrameKey {
        BoneFrameKey {
            frame_number: frame,
            location: Vec3::from_array(location),
            rotation,
            interpolation: [0; 64],
        }
    }

    #[test]
    fn interpolation_block_reshapes_by_channel() {
        let mut block = [0i8; 64];
        // x 通道: P1=(b0, b4), P2=(b8, b12)
        block[0] = 20;
        block[4] = 30;
        block[8] = 107;
        block[12] = 110;
        // r 通道: P1=(b3, b7), P2=(b11, b15)
        block[3] = 1;
        block[7] = 2;
        block[11] = 3;
        block[15] = 4;

        let interp = BoneInterpolation::from_block(&block);
        assert!((interp.x.x[0] - 20.0 / 127.0).abs() < 1e-6);
        assert!((interp.x.y[0] - 30.0 / 127.0).abs() < 1e-6);
        assert!((interp.x.x[1] - 107.0 / 127.0).abs() < 1e-6);
        assert!((interp.x.y[1] - 110.0 / 127.0).abs() < 1e-6);
        assert!((interp.r.x[0] - 1.0 / 127.0).abs() < 1e-6);
        assert!((interp.r.y[0] - 2.0 / 127.0).abs() < 1e-6);
        assert!((interp.r.x[1] - 3.0 / 127.0).abs() < 1e-6);
        assert!((interp.r.y[1] - 4.0 / 127.0).abs() < 1e-6);
    }

    #[test]
    fn linear_rate_handles_equal_frames() {
        let a = BoneMotionKey::from_frame_key(&frame_key(10, [0.0; 3], Quat::IDENTITY));
        let b = BoneMotionKey::from_frame_key(&frame_key(10, [0.0; 3], Quat::IDENTITY));
        assert_eq!(a.linear_rate(&b, 10), 0.0);

        let c = BoneMotionKey::from_frame_key(&frame_key(20, [0.0; 3], Quat::IDENTITY));
        assert!((a.linear_rate(&c, 15) - 0.5).abs() < 1e-6);
        assert!(a.linear_rate(&c, 5) < 0.0);
        assert!(a.linear_rate(&c, 30) > 1.0);
    }

    #[test]
    fn diagonal_curves_interpolate_linearly() {
        let mut cache = BezierCache::new();
        let mut cur = BoneMotionKey::from_frame_key(&frame_key(0, [0.0; 3], Quat::IDENTITY));
        cur.curves = BoneInterpolation {
            x: BezierControl::linear(),
            y: BezierControl::linear(),
            z: BezierControl::linear(),
            r: BezierControl::linear(),
        };
        let next = BoneMotionKey::from_frame_key(&frame_key(
            30,
            [0.0, 10.0, 0.0],
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
        ));

        let translation = cur.interp_translation(&next, 0.5, &mut cache);
        assert!(translation.abs_diff_eq(Vec3::new(0.0, 5.0, 0.0), 1e-3));

        let rotation = cur.interp_rotation(&next, 0.5, &mut cache);
        let expected = Quat::IDENTITY.slerp(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), 0.5);
        assert!(rotation.abs_diff_eq(expected, 1e-3));
    }
}
