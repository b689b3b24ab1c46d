// src/lib.rs
pub mod data {
    pub mod handle;
    pub mod meta;
    pub mod utility;
    pub mod ingest;
}

pub mod export {
    pub mod io;
    pub mod image;
    pub mod plot;
}

pub mod error;
