pub mod config;
pub mod coverage;
pub mod error;
pub mod event;
pub mod span;

pub use config::Config;
pub use coverage::{merge, uncovered_spans, CoverageSet};
pub use error::*;
pub use event::{Event, EventKey};
pub use span::{format_timestamp, parse_timestamp, TimeSpan};
