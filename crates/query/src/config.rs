//! Engine and scan configuration.

/// Default number of rows per produced batch.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// Options carried by every table scan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanOptions {
    /// Maximum rows per batch read from a row group (default: 8192)
    pub batch_size: usize,
    /// Skip row groups whose statistics exclude the scan filter (default: true)
    pub prune_row_groups: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            prune_row_groups: true,
        }
    }
}

impl ScanOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_prune_row_groups(mut self, prune: bool) -> Self {
        self.prune_row_groups = prune;
        self
    }
}

/// Configuration for an [`Engine`](crate::engine::Engine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Options for scans started through the engine.
    pub scan: ScanOptions,
    /// Run the pushdown optimizers before compiling (default: true)
    pub optimize: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            optimize: true,
        }
    }
}

impl EngineConfig {
    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }
}
