//! In-process collaborators and trace tooling.
pub mod emulated;
pub mod synthesizer;
