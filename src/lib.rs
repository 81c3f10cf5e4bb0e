pub mod io;
pub mod tiff;
pub mod compression;
pub mod raster;
pub mod model;
pub mod store;
pub mod worker;
pub mod dispatch;
pub mod errors;
pub mod config;
pub mod logging;
pub mod commands;

pub use config::AppConfig;
pub use dispatch::{Consumer, Dispatcher};
pub use errors::{PipelineError, PipelineResult};
pub use raster::{RasterDataset, RasterProfile};
pub use tiff::TiffReader;
pub use worker::{MultiLayerTiffWorker, Worker, WorkerRegistry};
