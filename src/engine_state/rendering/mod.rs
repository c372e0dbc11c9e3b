//! Geometry side of the engine.
//!
//! Nothing here talks to a GPU. Meshes are built into plain vertex arrays
//! ([`geometry_buffer::GeometryBuffer`]) that an external renderer uploads
//! from the staging buffer.
//!
//! ## Key Components
//!
//! * `geometry_buffer` - parallel position, normal and color arrays with a cursor
//! * `meshing` - face-culling mesher and the lock-free mesh freelist

pub mod geometry_buffer;
pub mod meshing;
