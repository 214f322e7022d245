//! Casting and image conversion helpers.

pub mod image_conversion;
pub mod safe_cast;
