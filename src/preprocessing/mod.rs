//! Label encoding for stacked predictions

mod encoder;

pub use encoder::LabelMap;
