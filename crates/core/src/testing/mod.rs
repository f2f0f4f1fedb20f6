//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external collaborator
//! traits, allowing the driver to be exercised without docker or a live
//! request source.
//!
//! # Example
//!
//! ```rust,ignore
//! use depot_core::testing::{fixtures, MockJobLauncher, MockRequestSource};
//!
//! let launcher = MockJobLauncher::new();
//! let source = MockRequestSource::new();
//!
//! // Configure mock responses
//! source.set_open(&["A", "B"], &[]).await;
//! store.insert_puzzle(fixtures::new_puzzle(1))?;
//! ```

mod mock_launcher;
mod mock_request_source;

pub use mock_launcher::MockJobLauncher;
pub use mock_request_source::MockRequestSource;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::store::NewPuzzle;

    /// Create a producer row pair whose modulus is unique per `seed`.
    pub fn new_puzzle(seed: u32) -> NewPuzzle {
        let seed = seed as u128;
        let p = 1_000_003 + 2 * seed;
        let q = 2_000_003 + 2 * seed;
        let modulus = p * q;
        let x = seed + 2;

        NewPuzzle {
            x: x.to_string(),
            y: (x * x % modulus).to_string(),
            t: 1 << 20,
            p: p.to_string(),
            q: q.to_string(),
            modulus: modulus.to_string(),
            phi: ((p - 1) * (q - 1)).to_string(),
        }
    }
}
