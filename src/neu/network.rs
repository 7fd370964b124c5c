//! Kohonen self-organizing map over the color space.
//!
//! Neurons compete for every sampled pixel; the winner and its neighborhood
//! move toward the sample with a learning rate and radius that decay over
//! the training cycles. Per-neuron frequency and bias counters keep rarely
//! winning neurons competitive so the map spreads over the whole gamut.

// NeuQuant Neural-Net quantization algorithm by Anthony Dekker, 1994.
// See "Kohonen neural networks for optimal colour quantization"
// in "Network: Computation in Neural Systems" Vol. 5 (1994) pp 351-367
// for a discussion of the algorithm.

use crate::pixel::Transparency;
use log::debug;
use palette::Srgba;
use rand::SeedableRng;
use rand_xoshiro::Xoroshiro128PlusPlus;
use std::collections::HashMap;

/// Number of neurons in the map.
pub(crate) const NETSIZE: usize = 256;
/// Number of reserved neurons excluded from initialization.
pub(crate) const SPECIALS: usize = 3;
pub(crate) const MAXNETPOS: usize = NETSIZE - 1;

/// Number of learning cycles.
const NCYCLES: usize = 115;

/// For 256 neurons the neighborhood radius starts at 32.
const INITRAD: u32 = (NETSIZE >> 3) as u32;
const RADIUSBIAS: u32 = 1 << 8;
const RADIUSDEC: f64 = 30.0;

/// The learning rate starts at 1, biased by 10 bits.
const INITALPHA: u32 = 1 << ALPHABIASSHIFT;
const ALPHABIASSHIFT: u32 = 10;
const ALPHARADBIAS: f64 = (1u32 << (ALPHABIASSHIFT + 8)) as f64;

const GAMMASHIFT: u32 = 10;
const BETASHIFT: u32 = 10;
const BETA: f64 = 1.0 / (1 << BETASHIFT) as f64;
const BETAGAMMA: f64 = (1 << (GAMMASHIFT - BETASHIFT)) as f64;

/// Gamma for the neuron bias curve; 1.0 leaves colors linear.
pub(crate) const GAMMA_CORRECTION: f64 = 1.0;

/// Four primes near 500 - assume no image has a length so large
/// that it is divisible by all four primes.
const PRIMES: [usize; 4] = [499, 491, 487, 503];

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Neuron {
    pub(crate) al: f64,
    pub(crate) r: f64,
    pub(crate) g: f64,
    pub(crate) b: f64,
}

/// The two best palette candidates for a color, kept so repeated pixels
/// skip the palette scan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Closest {
    pub(crate) first: u16,
    pub(crate) second: u16,
    pub(crate) first_dist: i32,
    pub(crate) second_dist: i32,
}

/// A self-organizing-map quantizer. One value lives per quantization call;
/// it owns every piece of scratch the engine needs.
pub(crate) struct SomNetwork {
    pub(crate) network: Vec<Neuron>,
    pub(crate) bias: Vec<f64>,
    pub(crate) freq: Vec<f64>,
    radpower: Vec<f64>,
    biasvalues: Vec<f64>,
    pub(crate) netindex: Vec<usize>,
    /// Palette entries sorted ascending by green, built by `build_index`.
    pub(crate) colormap: Vec<Srgba<u8>>,
    pub(crate) closest: HashMap<u32, Closest>,
    pub(crate) rng: Xoroshiro128PlusPlus,
    pub(crate) transparency: Transparency,
}

impl SomNetwork {
    pub(crate) fn new(seed: u64, transparency: Transparency) -> Self {
        let mut biasvalues = vec![0.0f64; NETSIZE];
        let mut network = vec![Neuron::default(); NETSIZE];
        let mut freq = vec![0.0f64; NETSIZE];

        for i in SPECIALS..NETSIZE {
            biasvalues[i] = ((i as f64 / 255.0).powf(1.0 / GAMMA_CORRECTION) * 255.0).round();

            let v = biasvalues[i * 256 / NETSIZE];
            // Alpha ramps up for the darkest neurons.
            let al = if i < 16 { (i * 16) as f64 } else { f64::from(u8::MAX) };
            network[i] = Neuron { al, r: v, g: v, b: v };

            freq[i] = 1.0 / NETSIZE as f64;
        }

        Self {
            network,
            bias: vec![0.0; NETSIZE],
            freq,
            radpower: Vec::new(),
            biasvalues,
            netindex: vec![0; NETSIZE],
            colormap: Vec::new(),
            closest: HashMap::new(),
            rng: Xoroshiro128PlusPlus::seed_from_u64(seed),
            transparency,
        }
    }

    pub(crate) fn biasvalue(&self, index: usize) -> f64 {
        self.biasvalues[index]
    }

    fn set_radpower(&mut self, alpha: f64, rad: u32) {
        self.radpower = (0..rad)
            .map(|i| (alpha * f64::from((rad * rad - i * i) * RADIUSBIAS / (rad * rad))).floor())
            .collect();
    }

    /// Moves the winning neuron toward the sample.
    fn alter_single(&mut self, alpha: f64, i: usize, al: f64, r: f64, g: f64, b: f64) {
        let alpha = alpha / f64::from(INITALPHA);
        let n = &mut self.network[i];
        n.al -= alpha * (n.al - al);
        n.b -= alpha * (n.b - b);
        n.g -= alpha * (n.g - g);
        n.r -= alpha * (n.r - r);
    }

    /// Moves the neighbors of `i` within `rad` positions toward the sample,
    /// with influence falling off by distance.
    fn alter_neighbors(&mut self, rad: u32, i: usize, al: f64, r: f64, g: f64, b: f64) {
        let lo = i.saturating_sub(rad as usize);
        let hi = (i + rad as usize).min(NETSIZE - 1);

        let mut up = i + 1;
        let mut down = i as isize - 1;
        let mut q = 1usize;
        while (up <= hi || down >= lo as isize) && q < self.radpower.len() {
            let a = self.radpower[q] / ALPHARADBIAS;
            q += 1;
            if up <= hi {
                let n = &mut self.network[up];
                n.al -= a * (n.al - al);
                n.b -= a * (n.b - b);
                n.g -= a * (n.g - g);
                n.r -= a * (n.r - r);
                up += 1;
            }
            if down >= lo as isize {
                #[allow(clippy::cast_sign_loss)]
                let n = &mut self.network[down as usize];
                n.al -= a * (n.al - al);
                n.b -= a * (n.b - b);
                n.g -= a * (n.g - g);
                n.r -= a * (n.r - r);
                down -= 1;
            }
        }
    }

    /// Finds the neuron winning the sample and updates the bias and
    /// frequency counters.
    ///
    /// The raw-distance winner collects the frequency reward, while the
    /// returned position minimizes the bias-adjusted distance, which steers
    /// samples away from overused neurons. The counters feed on the
    /// pre-decay frequency; reordering those updates changes the trained
    /// map.
    fn contest(&mut self, al: f64, r: f64, g: f64, b: f64) -> usize {
        let mut best_dist = f64::from(1u32 << 30);
        let mut best_bias_dist = best_dist;
        let mut best_pos = 0usize;
        let mut best_bias_pos = 0usize;

        for i in 0..NETSIZE {
            let best_bias_dist_biased = best_bias_dist + self.bias[i];
            let n = self.network[i];

            // Partial distance with early exit once both bests are beaten.
            let mut dist = (n.b - b).abs();
            dist += (n.r - r).abs();
            if dist < best_dist || dist < best_bias_dist_biased {
                dist += (n.g - g).abs();
                dist += (n.al - al).abs();

                if dist < best_dist {
                    best_dist = dist;
                    best_pos = i;
                }
                if dist < best_bias_dist_biased {
                    best_bias_dist = dist - self.bias[i];
                    best_bias_pos = i;
                }
            }

            let betafreq = self.freq[i] / f64::from(1 << BETASHIFT);
            self.freq[i] -= betafreq;
            self.bias[i] += betafreq * f64::from(1 << GAMMASHIFT);
        }

        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETAGAMMA;
        best_bias_pos
    }

    /// Trains the map over the pixels, visiting one sample in
    /// `sample_frac` and walking the image on a prime stride so successive
    /// samples land far apart.
    pub(crate) fn learn(&mut self, pixels: &[Srgba<u8>], sample_frac: u32) {
        if pixels.is_empty() {
            return;
        }

        let alphadec = f64::from(30 + (sample_frac - 1) / 3);
        let lengthcount = pixels.len();
        let samplepixels = lengthcount / sample_frac as usize;
        let delta = (samplepixels / NCYCLES).max(1);

        let mut alpha = f64::from(INITALPHA);
        let mut radius = f64::from(INITRAD);
        let mut rad = radius as u32;
        if rad <= 1 {
            rad = 0;
        }
        self.set_radpower(alpha, rad);

        debug!("training on {samplepixels} of {lengthcount} pixels, step {delta}");

        let mut pos = 0usize;
        let mut step_index = 0usize;
        let mut i = 0usize;
        while i < samplepixels {
            let c = pixels[pos];
            if c.alpha > 0 {
                let al = f64::from(c.alpha);
                let r = f64::from(c.red);
                let g = f64::from(c.green);
                let b = f64::from(c.blue);

                let j = self.contest(al, r, g, b);
                self.alter_single(alpha, j, al, r, g, b);
                if rad > 0 {
                    self.alter_neighbors(rad, j, al, r, g, b);
                }
            }

            pos += PRIMES[step_index % PRIMES.len()];
            step_index += 1;
            while pos >= lengthcount {
                pos -= lengthcount;
            }

            i += 1;
            if i % delta == 0 {
                alpha -= alpha / alphadec;
                radius -= radius / RADIUSDEC;
                rad = radius as u32;
                if rad <= 1 {
                    rad = 0;
                }
                self.set_radpower(alpha, rad);
            }
        }
    }
}
