//! Stand-ins for the host solver: a refinable grid and an analytic field.
//!
//! - [`mesh`] -- [`GridMesh`], a strip-partitioned 2^D-tree grid that
//!   implements [`MeshEngine`].
//! - [`field`] -- [`SupersaturatedField`], a cone-shaped field with
//!   suppression around released nuclei that implements [`FieldSource`].
//!
//! [`MeshEngine`]: nucleation_core::mesh::MeshEngine
//! [`FieldSource`]: nucleation_core::field::FieldSource

pub mod field;
pub mod mesh;

pub use field::SupersaturatedField;
pub use mesh::GridMesh;
