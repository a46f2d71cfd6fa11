//! 子网格：材质对应的连续面索引范围

/// 子网格
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubMesh {
    pub begin_index: u32,
    pub index_count: u32,
    pub material_id: i32,
}
