//! Discovery & Pairing (§4.1): advertisement classification, de-duplication,
//! and scan-loop resilience.

pub mod classifier;
pub mod pairer;
pub mod scanner;

pub use classifier::classify;
pub use pairer::Pairer;
pub use scanner::Scanner;
