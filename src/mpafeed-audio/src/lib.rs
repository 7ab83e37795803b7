mod format;
#[cfg(any(test, feature = "cpal-backend"))]
mod queue;
#[cfg(feature = "cpal-backend")]
mod real;
mod sink;
mod source;

pub use format::{SampleEncoding, StreamFormat};
#[cfg(feature = "cpal-backend")]
pub use real::CpalSink;
pub use sink::{AudioSink, MemorySink, NullSink, RawFileSink, SinkError, SinkLog};
pub use source::{
    read_block, ByteSource, FileOpener, FileSource, MemoryOpener, MemorySource, SourceError,
    SourceOpener,
};
