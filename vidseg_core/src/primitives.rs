pub mod annotation;
pub use annotation::*;
pub mod bbox;
pub use bbox::*;
pub mod image;
pub use image::*;
pub mod mask;
pub use mask::*;
