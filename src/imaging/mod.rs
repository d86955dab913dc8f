//! Image conversion, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Convert → WebP** | `image` lossless WebP encoder |
//! | **Convert → AVIF** | `image` + rav1e encoder |
//!
//! The module is split into:
//! - **Parameters**: data structures describing a conversion
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use params::{ConvertParams, Quality};
pub use rust_backend::RustBackend;
