mod canvas;
mod drill;
mod geometry;
mod image;
mod interpreter;
mod layer;
mod program;
mod renderer;
mod spacial;

#[cfg(feature = "egui")]
mod drawing;

pub use canvas::*;
pub use drill::*;
#[cfg(feature = "egui")]
pub use drawing::*;
pub use geometry::*;
pub use image::*;
pub use interpreter::*;
pub use layer::*;
pub use program::*;
pub use renderer::*;
pub use spacial::*;

#[cfg(any(test, feature = "testing"))]
pub mod testing;
