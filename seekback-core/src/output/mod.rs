//! Everything that touches dump files on disk: the AIFF encoder, output
//! naming and the "latest recording" link.

pub mod aiff;
pub mod latest;
pub mod naming;

pub use aiff::{AiffHeader, AiffWriter};
pub use naming::NameTemplate;
