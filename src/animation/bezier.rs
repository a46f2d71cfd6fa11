//! 贝塞尔缓动曲线
//!
//! 端点固定为 (0,0) 与 (1,1) 的三次贝塞尔。给定两个控制点与线性进度，
//! 用二分法反解参数 t 使 x(t) 等于进度，再求 y(t) 作为缓动系数。

use std::collections::HashMap;

/// 单条缓动曲线的控制点（单位正方形内）
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BezierControl {
    /// 两控制点的 X 坐标
    pub x: [f32; 2],
    /// 两控制点的 Y 坐标
    pub y: [f32; 2],
}

impl BezierControl {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: [x1, x2],
            y: [y1, y2],
        }
    }

    /// 线性曲线（缓动系数等于线性进度）
    pub fn linear() -> Self {
        Self::new(0.25, 0.25, 0.75, 0.75)
    }
}

/// 二分法反解缓动系数
///
/// 固定 15 次迭代，步长 1/(4·2^i)，|x(t) - linear_rate| < 1e-5 时提前结束。
/// 纯函数，可按三个输入安全记忆化。
pub fn solve_bezier(control: BezierControl, linear_rate: f32) -> f32 {
    // 端点精确命中
    if linear_rate <= 0.0 {
        return 0.0;
    }
    if linear_rate >= 1.0 {
        return 1.0;
    }

    let [x1, x2] = control.x;
    let mut t = 0.5f32;
    let mut s = 0.5f32;
    for i in 0..15u32 {
        let ft = 3.0 * s * s * t * x1 + 3.0 * s * t * t * x2 + t * t * t - linear_rate;
        if ft.abs() < 1e-5 {
            break;
        }
        let step = 1.0 / (4u32 << i) as f32;
        if ft > 0.0 {
            t -= step;
        } else {
            t += step;
        }
        s = 1.0 - t;
    }

    let [y1, y2] = control.y;
    3.0 * s * s * t * y1 + 3.0 * s * t * t * y2 + t * t * t
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    x: [u32; 2],
    y: [u32; 2],
    rate: u32,
}

impl CacheKey {
    fn new(control: BezierControl, rate: f32) -> Self {
        Self {
            x: [control.x[0].to_bits(), control.x[1].to_bits()],
            y: [control.y[0].to_bits(), control.y[1].to_bits()],
            rate: rate.to_bits(),
        }
    }
}

/// 二分结果记忆化缓存
///
/// 由 `Motion` 独占持有；跨线程共享时需要外部同步。
#[derive(Clone, Default)]
pub struct BezierCache {
    map: HashMap<CacheKey, f32>,
}

/// 缓存容量上限，满后整体清空
const CACHE_CAPACITY: usize = 512;

impl BezierCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn solve(&mut self, control: BezierControl, linear_rate: f32) -> f32 {
        let key = CacheKey::new(control, linear_rate);
        if let Some(&value) = self.map.get(&key) {
            return value;
        }
        let value = solve_bezier(control, linear_rate);
        if self.map.len() >= CACHE_CAPACITY {
            self.map.clear();
        }
        self.map.insert(key, value);
        value
    }
}
