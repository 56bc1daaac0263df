//! Diffusion MRI: scan loading and the fixed tractography pipeline.
//!
//! Stages, in the order the pipeline runs them: [`bundle`] (NIfTI image plus
//! gradient table), [`mask`], [`tensor`], [`peaks`] over the [`sphere`],
//! [`tracking`]. [`pipeline::run`] ties them together.

pub mod bundle;
pub mod gradients;
pub mod grid;
pub mod mask;
pub mod nifti;
pub mod peaks;
pub mod pipeline;
pub mod sphere;
pub mod tensor;
pub mod tracking;

#[cfg(test)]
pub mod test_support;
