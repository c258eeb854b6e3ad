pub mod cv_bridge;
pub mod image_helper;
