//! Room code generation.

use impostor_protocol::RoomCode;
use rand::{Rng, RngCore};

/// Produces candidate room codes.
///
/// Generators are stateless and may repeat themselves; checking a code
/// against the rooms that currently exist is the registry's job. The
/// random source is passed in so one process-wide RNG can serve every
/// generator call.
pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self, rng: &mut dyn RngCore) -> RoomCode;
}

/// The default generator: six letters drawn uniformly from `A..=Z`.
///
/// 26^6 ≈ 309 million codes, so collisions only matter when a test forces
/// them.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlphaCodes;

impl CodeGenerator for AlphaCodes {
    fn generate(&self, rng: &mut dyn RngCore) -> RoomCode {
        let mut indices = [0usize; RoomCode::LEN];
        for slot in &mut indices {
            *slot = rng.random_range(0..RoomCode::ALPHABET.len());
        }
        RoomCode::from_indices(indices)
    }
}
