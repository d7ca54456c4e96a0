//! Orchestration layer for the GNU Ocrad OCR engine.
//!
//! Images are normalized to a binary PGM raster, options are validated into
//! an ordered engine plan, and one engine session per call runs the plan with
//! guaranteed cleanup. Results come back as plain text, the raw report, or a
//! parsed block/line/letter hierarchy.
//!
//! ```no_run
//! use ocrad_bridge::{Config, Invocation, Ocrad, RecognitionOptions};
//!
//! # fn main() -> ocrad_bridge::Result<()> {
//! let ocrad = Ocrad::from_config(&Config::from_env());
//! let image = ocrad_bridge::ImageInput::open("scan.png")?;
//! let options = RecognitionOptions {
//!     verbose: true,
//!     ..Default::default()
//! };
//! let result = ocrad.recognize(Invocation::with_options(image, options))?;
//! if let Some(structured) = result.as_structured() {
//!     println!("{} letters", structured.letters.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod models;
pub mod options;
pub mod raster;
pub mod report;
pub mod session;

pub use config::Config;
pub use dispatcher::{Invocation, Ocrad};
pub use error::{OcradError, Result};
pub use models::{Block, Letter, Line, Match, Recognition, StructuredResult};
pub use options::{FilterName, RecognitionOptions, TransformName};
pub use raster::{ImageInput, PixelBuffer};
