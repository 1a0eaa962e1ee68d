pub mod capabilities;
pub mod common;
pub mod image;

pub use capabilities::*;
pub use common::*;
pub use image::*;
