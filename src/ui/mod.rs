//! Terminal output for task logs, metrics, and errors

pub mod output;

pub use output::{
    cache_spinner, error, format_duration, print_metrics, ConsoleSink, OutputSink,
};
