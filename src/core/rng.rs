//! Seedable Random Number Generator
//!
//! Xorshift128+ seeded through SplitMix64. The world owns one instance, so
//! spawn points and powerup delays are reproducible from a seed in tests and
//! vary per process in production (see `main`).

use super::geometry::Bounds;
use super::vec2::Vec2;

/// Xorshift128+ generator.
///
/// # Example
///
/// ```
/// use tank_wars::core::rng::WorldRng;
///
/// let mut a = WorldRng::new(12345);
/// let mut b = WorldRng::new(12345);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Clone, Debug)]
pub struct WorldRng {
    state: [u64; 2],
}

impl Default for WorldRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl WorldRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // Ensure state is never all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Generate a random integer in range [min, max].
    #[inline]
    pub fn next_int_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u64;
        min + (self.next_u64() % range) as i64
    }

    /// Random whole-number point inside the bounds, in `[-half, half)` on
    /// both axes.
    pub fn random_point(&mut self, bounds: Bounds) -> Vec2 {
        let half = bounds.half.floor() as i64;
        let x = self.next_int_range(-half, half - 1);
        let y = self.next_int_range(-half, half - 1);
        Vec2::new(x as f64, y as f64)
    }

    /// Frame delay in `[1, max_delay]`.
    pub fn roll_delay(&mut self, max_delay: u32) -> u32 {
        self.next_int_range(1, i64::from(max_delay.max(1))) as u32
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

// =============================================================================
// TESTS
// =============================================================================
