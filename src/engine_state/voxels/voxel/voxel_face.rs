//! # Voxel Face Module
//!
//! The six axis-aligned faces of a voxel, with their neighbor offsets, normals
//! and vertex templates. World axes are z-up: `Top`/`Bottom` face ±z and
//! `Front`/`Back` face ±y.

use cgmath::Vector3;

/// Vertices emitted per visible face (two triangles, no index buffer).
pub const VERTS_PER_FACE: usize = 6;

/// One face of a voxel cube.
///
/// The order is the order in which the mesher tests neighbors:
/// [Right, Left, Bottom, Top, Front, Back]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum VoxelFace {
    /// Facing +x
    Right = 0,
    /// Facing -x
    Left = 1,
    /// Facing -z
    Bottom = 2,
    /// Facing +z
    Top = 3,
    /// Facing +y
    Front = 4,
    /// Facing -y
    Back = 5,
}

/// Quad corners for each face of a unit cube at the origin, counter-clockwise
/// when seen from outside: lower-left, lower-right, upper-right, upper-left.
const FACE_CORNERS: [[[f32; 3]; 4]; 6] = [
    // Right
    [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
    // Left
    [[0.0, 1.0, 0.0], [0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0]],
    // Bottom
    [[0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
    // Top
    [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
    // Front
    [[1.0, 1.0, 0.0], [0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0]],
    // Back
    [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
];

/// Corner order for the two triangles of a quad.
const QUAD_TRIANGLES: [usize; VERTS_PER_FACE] = [0, 1, 2, 0, 2, 3];

impl VoxelFace {
    /// All six faces in mesher order.
    pub fn all() -> [VoxelFace; 6] {
        [
            VoxelFace::Right,
            VoxelFace::Left,
            VoxelFace::Bottom,
            VoxelFace::Top,
            VoxelFace::Front,
            VoxelFace::Back,
        ]
    }

    /// Offset to the neighbor this face looks at.
    pub fn offset(self) -> Vector3<i32> {
        match self {
            VoxelFace::Right => Vector3::new(1, 0, 0),
            VoxelFace::Left => Vector3::new(-1, 0, 0),
            VoxelFace::Bottom => Vector3::new(0, 0, -1),
            VoxelFace::Top => Vector3::new(0, 0, 1),
            VoxelFace::Front => Vector3::new(0, 1, 0),
            VoxelFace::Back => Vector3::new(0, -1, 0),
        }
    }

    /// Outward unit normal.
    pub fn normal(self) -> [f32; 3] {
        let offset = self.offset();
        [offset.x as f32, offset.y as f32, offset.z as f32]
    }

    /// Writes the six vertex positions of this face for a box at `min` with
    /// edge lengths `diameter`.
    pub fn vertices(self, min: [f32; 3], diameter: [f32; 3]) -> [[f32; 3]; VERTS_PER_FACE] {
        let corners = &FACE_CORNERS[self as usize];
        QUAD_TRIANGLES.map(|corner| {
            let c = corners[corner];
            [
                min[0] + c[0] * diameter[0],
                min[1] + c[1] * diameter[1],
                min[2] + c[2] * diameter[2],
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    fn to_vec(p: [f32; 3]) -> cgmath::Vector3<f32> {
        cgmath::Vector3::new(p[0], p[1], p[2])
    }

    #[test]
    fn triangles_wind_outward() {
        for face in VoxelFace::all() {
            let verts = face.vertices([0.0; 3], [1.0; 3]);
            let normal = to_vec(face.normal());
            for triangle in verts.chunks(3) {
                let a = to_vec(triangle[0]);
                let b = to_vec(triangle[1]);
                let c = to_vec(triangle[2]);
                let winding = (b - a).cross(c - a).normalize();
                assert!(winding.dot(normal) > 0.99, "{:?} winds inward", face);
            }
        }
    }

    #[test]
    fn face_lies_on_its_side_of_the_box() {
        let verts = VoxelFace::Top.vertices([2.0, 3.0, 4.0], [1.0, 1.0, 2.0]);
        assert!(verts.iter().all(|v| v[2] == 6.0));
        let verts = VoxelFace::Left.vertices([2.0, 3.0, 4.0], [1.0; 3]);
        assert!(verts.iter().all(|v| v[0] == 2.0));
    }
}
