// # Fingerprint Ledgers
//
// Implementations of the FingerprintStore trait.

pub mod file;
pub mod memory;

pub use file::FileLedger;
pub use memory::MemoryLedger;
