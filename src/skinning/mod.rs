//! 顶点蒙皮

mod skinning;

pub use skinning::{blend_vertex_transform, vertex_transforms};
