pub mod ingest;
pub mod transport;
pub mod wire;
