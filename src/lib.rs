// THEORY:
// This file is the entry point for the `dronesight` library crate. It exposes
// two per-pair pipelines over aerial imagery and the batch layer that runs them
// across a directory:
//
// - The thermal pipeline aligns a thermal frame to its RGB counterpart with a
//   multi-scale search over structural skeletons and blends it in where it
//   carries data (`pipeline::overlay_thermal`).
// - The change pipeline registers an "after" frame onto a "before" frame with
//   ORB features and a RANSAC homography, then finds, labels and crops the
//   regions that changed (`core_modules::change_detector::detect_and_annotate`).
//
// The numerical building blocks live in `core_modules`. `pipeline` wires them
// into per-pair entry points, `discovery` pairs files by naming convention and
// `parallel_pipeline` runs the pairs on a fixed-size worker pool.

pub mod config;
pub mod core_modules;
pub mod discovery;
pub mod error;
pub mod logger;
pub mod parallel_pipeline;
pub mod pipeline;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use parallel_pipeline::{BatchOrchestrator, BatchReport};
pub use pipeline::{PairResult, PairStatus, PairTask, PipelineKind};
