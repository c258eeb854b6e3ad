pub mod aligner;
pub mod alignment;
pub mod annotator;
pub mod change_detector;
pub mod colormap;
pub mod compositor;
pub mod glyphs;
pub mod raster_ops;
pub mod registrar;
pub mod skeleton;
pub mod template_match;
pub mod utils;
