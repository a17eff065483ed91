pub mod broadcast;
pub mod channel;
pub mod error;
pub mod lock;
pub mod logging;
pub mod shutdown;
pub mod timestamp;

pub use broadcast::Broadcaster;
pub use channel::{ClosableChannel, Recv};
pub use error::{ConfigError, TranscodeError, WireError, WireResult};
pub use logging::{ComponentLogger, LogContext};
pub use shutdown::{Closer, ConnectionCloser, ShutdownSignal};
pub use timestamp::*;
