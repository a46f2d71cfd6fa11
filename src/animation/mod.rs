//! VMD 动画解析与关键帧插值

mod bezier;
mod keyframe;
mod motion;
mod vmd_file;

pub use bezier::{solve_bezier, BezierCache, BezierControl};
pub use keyframe::{BoneInterpolation, BoneMotionKey};
pub use motion::Motion;
pub use vmd_file::{
    BoneFrameKey, CameraKeyFrameKey, IkState, LampKeyFrameKey, PropertyFrameKey,
    SelfShadowFrameKey, ShapeKeyFrameKey, VmdFile, VMD_SIGNATURE,
};
