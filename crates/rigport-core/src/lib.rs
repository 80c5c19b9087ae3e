//! Rigport Core - Math foundations for the rigport importer
//!
//! This crate provides the numeric layer shared by the importer:
//! - Vector and matrix primitives (re-exported from glam)
//! - Up-axis handling and coordinate-system conversion
//! - Quantization and row-major matrix decoding helpers

pub mod axis;
pub mod math;

pub use axis::{CoordinateConverter, ParseUpAxisError, UpAxis};
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
pub use math::{mat4_from_row_major, round_to_digits, RoundToDigits, QUANTIZE_DIGITS};
