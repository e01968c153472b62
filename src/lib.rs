//! Readers and writers for the binary container/record formats used by a
//! game-studio asset pipeline: TAB/ARC archives, SARC stream archives (plus
//! their TOC patch overlays), RTPC property-container trees, ADF
//! reflection-driven typed records, and thin collaborators for AAF and
//! RBMDL.

pub mod aaf;
pub mod adf;
pub mod compress;
pub mod cursor;
pub mod error;
pub mod hash;
pub mod rbmdl;
pub mod resource_bundle;
pub mod rtpc;
pub mod sarc;
pub mod tab;

pub use error::{Error, Result};
