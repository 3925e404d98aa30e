//! API key rotation for rate-limited completion services
//!
//! Holds an ordered pool of API keys and a single client bound to the active
//! key. Calls go through `KeyRotator::execute_with_retry`, which retries on
//! rate limits by rotating to the next key, and fails fast on anything else.
//!
//! Key lifecycle:
//! 1. Keys loaded once at startup → pool built, client bound to key #1
//! 2. Call succeeds → result returned, active key unchanged
//! 3. Call rate limited → rotate `i → (i + 1) mod n`, rebuild client, retry
//! 4. Every key rate limited → `Exhausted` (or `NoBackupKeys` with one key)
//! 5. Any other failure → returned immediately, no rotation

pub mod error;
pub mod pool;
pub mod rotator;

pub use error::{Error, Result};
pub use pool::CredentialPool;
pub use rotator::{KeyRotator, KeyStatus};
