pub mod observation;
pub mod preprocess;
pub mod spike_filter;
pub mod slope;
pub mod predictor;
pub mod resample;
pub mod gap_fill;
pub mod document;
pub mod traits;
pub mod youtube;
pub mod controller;
pub mod config;

pub use observation::{Observation, Stamp};
pub use predictor::{delta, floor_to_half_hour, predict, Forecaster};
pub use slope::{SlopeEstimate, SlopeEstimator};
