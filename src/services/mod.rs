//! Services separating I/O, encoding, export and progress concerns from the session

pub mod export;
pub mod format;
pub mod io;
pub mod progress;

pub use export::{
    DirectoryExportStore, ExportMetadata, ExportPayload, ExportReceipt, ExportRequest,
    ExportService, ExportStore, MemoryExportStore,
};
pub use format::OutputFormatHandler;
pub use io::{ImageIOService, ImageSource};
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
