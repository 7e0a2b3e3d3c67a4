//! Meteorological inputs: the FLEXPART `AVAILABLE` index.
//!
//! FLEXPART learns which meteorological fields exist, and for which times,
//! from a fixed-format text file named `AVAILABLE` that lives next to the
//! GRIB products. This module builds that file from a directory of products
//! whose names carry a compact timestamp after a common prefix (`EC` for
//! flex_extract output).
//!
//! # Modules
//!
//! - [`timestamp`]: suffix formats and two-digit-year windowing
//! - [`available`]: directory scan and window selection with fallback
//! - [`observer`]: `MeteoObserver` capability injected into the builder
//! - [`error`]: `MeteoError` / `MeteoResult`

pub mod available;
pub mod error;
pub mod observer;
pub mod timestamp;

pub use available::{
    build_manifest, classify_products, create_available_file, scan_products, select_entries,
    AvailabilityEntry, AvailabilityManifest, InputFile, AVAILABLE_FILE_NAME,
    DEFAULT_PRODUCT_PREFIX, MANIFEST_HEADER,
};
pub use error::{MeteoError, MeteoResult};
pub use observer::{MeteoObserver, NoopObserver, TracingObserver};
pub use timestamp::{parse_product_timestamp, parse_suffix, SuffixFormat};
