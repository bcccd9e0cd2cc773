mod coordinator;
mod error;
mod logging;
mod watermark;

pub use coordinator::{infer_schema, sync, SyncError, SyncOptions, SyncResult};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use watermark::{Watermark, WatermarkStore, DEFAULT_WATERMARK_SUBDIR};
