pub mod ingest;
pub mod pool;

pub use ingest::{IngestError, IngestResult, Ingestor, InstructionValidator, SignatureValidator};
pub use pool::{PendingPool, PoolError};
