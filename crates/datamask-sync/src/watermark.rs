//! Incremental cursor lookup.

use tracing::{debug, warn};

use crate::core::traits::TargetWriter;
use crate::core::value::SqlValue;

/// Reads the high-water mark of a sink table.
pub struct WatermarkTracker<'a, W: TargetWriter + ?Sized> {
    sink: &'a W,
}

impl<'a, W: TargetWriter + ?Sized> WatermarkTracker<'a, W> {
    pub fn new(sink: &'a W) -> Self {
        Self { sink }
    }

    /// `MAX(filter_column)` in the sink.
    ///
    /// Returns `None` when the table is empty, the column does not exist or
    /// the lookup fails; the caller then falls back to a full load.
    pub async fn max_watermark(&self, table: &str, filter_column: &str) -> Option<SqlValue> {
        match self.sink.max_value(table, filter_column).await {
            Ok(Some(v)) if !v.is_null() => {
                debug!("{}: watermark {}={:?}", table, filter_column, v);
                Some(v)
            }
            Ok(_) => {
                debug!("{}: no watermark, sink table is empty", table);
                None
            }
            Err(e) => {
                warn!(
                    "{}: could not read watermark from {}: {}. Falling back to full load",
                    table, filter_column, e
                );
                None
            }
        }
    }
}
