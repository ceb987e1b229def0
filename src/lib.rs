pub mod bbox;
pub mod circular_queue;
pub mod color;
pub mod config;
pub mod context;
pub mod decoder;
pub mod detection;
pub mod error;
pub mod frame;
pub mod labels;
pub mod nms;
pub mod pipeline;
pub mod predictor;
pub mod scene;
pub mod sigmoid;
pub mod tracker;

mod track;

pub use color::{ColorDescriptor, ColorName, ColorSampler};
pub use config::Config;
pub use context::{Context, ContextClassifier, ContextProfile};
pub use decoder::{DecodeReport, ScaleSpec, TensorLayout, YoloDecoder};
pub use detection::Detection;
pub use error::Error;
pub use frame::{BlobMapping, Frame};
pub use labels::ClassNames;
pub use nms::Suppressor;
pub use pipeline::{FrameOutput, FrameStatus, Pipeline};
pub use sigmoid::SigmoidTable;
pub use track::{Track, TrackingQuality};
pub use tracker::Tracker;

use std::rc::Rc;

pub trait Tracking {
    fn update(&mut self, detections: &[Detection]);
    fn tracks(&self) -> Rc<[Track]>;
}
