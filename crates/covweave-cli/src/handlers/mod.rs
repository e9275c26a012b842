//! Command handlers
//!
//! Each handler resolves its arguments against the coverage configuration,
//! drives the library, and renders the outcome.

pub mod config;
pub mod instrument;
pub mod merge;
pub mod report;
pub mod settings;

pub use config::execute_config;
pub use instrument::{apply_exclusions, execute_instrument};
pub use merge::execute_merge;
pub use report::{execute_report, parse_thresholds, render_text};
pub use settings::execute_settings;
