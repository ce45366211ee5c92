//! Decoders turning raw GATT frames into typed measurements (§4.5).

pub mod bp;
pub mod temp;

pub use bp::BpDecoder;
pub use temp::TempDecoder;

use thiserror::Error;

/// A decode failure. Per §7, the frame is dropped and a `DecoderDropped`
/// status event is emitted — the subscription itself is never torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame too short: need at least {need} bytes, got {got}")]
    InsufficientBytes { need: usize, got: usize },
    #[error("no decode strategy produced a plausible value")]
    AllStrategiesFailed,
}
