// data module
pub mod data {
    pub mod spectrum;
    pub mod processing;
    pub mod dataset;
    pub mod pipeline;
}

// algorithm module
pub mod algorithm {
    pub mod vec_utils;
    pub mod interpolation;
    pub mod alignment;
    pub mod splitting;
    pub mod scaling;
}

pub mod error;
