//! CLI-level error wrapper. `vtrie-core::PipelineError` covers the pipeline's
//! own failure kinds; this type adds the I/O and configuration failures that
//! only exist on this side of the crate boundary.

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("shapefile error: {0}")]
    Shapefile(#[from] shapefile::Error),

    #[error("gtfs error: {0}")]
    Gtfs(#[from] gtfs_structures::Error),

    #[error(transparent)]
    Pipeline(#[from] vtrie_core::PipelineError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CliError {
    /// exit codes: 1 invalid input or fatal pipeline abort (the
    /// `InputMissing`/`CatalogInvalid` kinds, aborted before any worker
    /// started) — everything recoverable is caught and recorded inside a
    /// worker instead, so it never surfaces as a `CliError`. A worker panic
    /// (exit code 3) is recorded in the manifest and surfaces through
    /// `vtrie_core::manifest::exit_code`, not through this type.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
