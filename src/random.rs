use core::cmp::min;
use core::f64::consts::TAU;
use log::warn;
use rand::{Rng, RngCore, SeedableRng};
use std::{
    fs::File,
    io::{self, Read},
    time::{SystemTime, UNIX_EPOCH},
};

/// Scale a percentage onto the full `u64` range, for comparison against [RngCore::next_u64]
pub const fn percent(x: u64) -> u64 {
    x * (u64::MAX / 100)
}

/// Whether an event of probability `p` (as produced by [percent]) happens on this roll
#[inline]
pub fn happens(rng: &mut impl RngCore, p: u64) -> bool {
    p > rng.next_u64()
}

/// A standard normal sample produced with the Box–Muller transform
pub fn box_muller(rng: &mut impl Rng) -> f64 {
    // u1 must stay away from 0 so ln is finite
    let u1 = 1. - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2. * u1.ln()).sqrt() * (TAU * u2).cos()
}

/// Uniform sample in `[-amplitude, amplitude]`, or 0 when the amplitude is not positive
#[inline]
pub fn jitter(rng: &mut impl Rng, amplitude: f64) -> f64 {
    if amplitude > 0. {
        rng.random_range(-amplitude..=amplitude)
    } else {
        0.
    }
}

pub struct WyRng {
    state: u64,
}

impl WyRng {
    pub fn seeded(state: u64) -> Self {
        Self { state }
    }
}

impl RngCore for WyRng {
    fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    fn next_u64(&mut self) -> u64 {
        const WY_CONST_0: u64 = 0x2d35_8dcc_aa6c_78a5;
        const WY_CONST_1: u64 = 0x8bb8_4b93_962e_acc9;
        self.state = self.state.wrapping_add(WY_CONST_0);
        let t = u128::from(self.state) * u128::from(self.state ^ WY_CONST_1);
        (t as u64) ^ (t >> 64) as u64
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        let mut idx = 0;
        while idx < dst.len() {
            let lim = min(8, dst.len() - idx);
            dst[idx..idx + lim].copy_from_slice(&self.next_u64().to_ne_bytes()[..lim]);
            idx += lim;
        }
    }
}

impl SeedableRng for WyRng {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::seeded(u64::from_le_bytes(seed))
    }
}

pub fn seed_urandom() -> io::Result<u64> {
    let mut file = File::open("/dev/urandom")?;
    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)?;
    Ok(u64::from_le_bytes(buffer))
}

/// Seed from `/dev/urandom`, or from the clock where that isn't available
pub fn seed() -> u64 {
    seed_urandom().unwrap_or_else(|err| {
        warn!("urandom unavailable ({err}), seeding from the clock");
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5eed)
    })
}

pub fn default_rng() -> WyRng {
    WyRng::seeded(seed())
}
