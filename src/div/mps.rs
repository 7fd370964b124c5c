//! Nearest palette entry lookup over a sum-sorted palette.
//!
//! The palette is sorted by the sum of its components and probed starting
//! from the entry whose sum is nearest the query's. Walking outward in both
//! directions, a direction stops as soon as the squared-distance lower
//! bound derived from the sum gap can no longer beat the best distance
//! found, which prunes most of the palette for typical queries.

use crate::pixel::l1_distance;
use palette::Srgba;

/// Highest possible component sum (four channels of 255).
const MAX_SUM: usize = 4 * u8::MAX as usize;

struct Entry {
    color: Srgba<u8>,
    sum: i32,
    /// Position of this entry in the caller's palette order.
    index: u32,
}

/// Sum-indexed search structure over a palette.
pub(crate) struct SumSortedPalette {
    entries: Vec<Entry>,
    /// For every possible component sum, the entry whose sum is nearest.
    lut_init: Vec<u32>,
    /// Lower bound `floor(d^2 / 3)` for every sum difference `d`, offset
    /// by `MAX_SUM`.
    lut_ssd: Vec<u32>,
}

impl SumSortedPalette {
    pub(crate) fn new(palette: &[Srgba<u8>]) -> Self {
        let count = palette.len();

        #[allow(clippy::cast_possible_truncation)]
        let mut entries: Vec<Entry> = palette
            .iter()
            .enumerate()
            .map(|(i, &color)| Entry {
                color,
                sum: i32::from(color.alpha)
                    + i32::from(color.red)
                    + i32::from(color.green)
                    + i32::from(color.blue),
                index: i as u32,
            })
            .collect();
        entries.sort_by_key(|e| e.sum);

        let mut lut_ssd = vec![0u32; 2 * MAX_SUM + 1];
        for d in 1..=MAX_SUM {
            // Premultiplied by 1/3: the L2 bound implied by an L1 gap of d.
            let bound = (d * d / 3) as u32;
            lut_ssd[MAX_SUM + d] = bound;
            lut_ssd[MAX_SUM - d] = bound;
        }

        // Boundaries between adjacent entries sit at the midpoint of their
        // sums; everything past the last midpoint maps to the last entry.
        let midpoint = |a: i32, b: i32| (0.5 * f64::from(a + b) + 0.5) as usize;
        let mut lut_init = vec![0u32; MAX_SUM + 1];
        if count >= 2 {
            let high = midpoint(entries[count - 2].sum, entries[count - 1].sum);
            #[allow(clippy::cast_possible_truncation)]
            for slot in lut_init.iter_mut().skip(high) {
                *slot = count as u32 - 1;
            }
            for ic in 1..count - 1 {
                let low = midpoint(entries[ic - 1].sum, entries[ic].sum);
                let high = midpoint(entries[ic].sum, entries[ic + 1].sum);
                #[allow(clippy::cast_possible_truncation)]
                for slot in lut_init.iter_mut().take(high).skip(low) {
                    *slot = ic as u32;
                }
            }
        }

        Self { entries, lut_init, lut_ssd }
    }

    /// Position in the original palette of the entry nearest to `c` by
    /// alpha-inclusive L1 distance.
    pub(crate) fn nearest(&self, c: Srgba<u8>) -> u32 {
        let entries = &self.entries;
        let count = entries.len();
        let sum = (i32::from(c.alpha) + i32::from(c.red) + i32::from(c.green) + i32::from(c.blue))
            as usize;

        let mut index = self.lut_init[sum] as usize;
        let mut min_dist = l1_distance(c, entries[index].color);

        let mut upi = index;
        let mut downi = index;
        let mut up = true;
        let mut down = true;
        while up || down {
            if up {
                upi += 1;
                if upi > count - 1 || self.sum_bound(sum, entries[upi].sum) >= min_dist {
                    up = false;
                } else {
                    let dist = l1_distance(c, entries[upi].color);
                    if dist < min_dist {
                        min_dist = dist;
                        index = upi;
                    }
                }
            }

            if down {
                if downi == 0 {
                    down = false;
                } else {
                    downi -= 1;
                    if self.sum_bound(sum, entries[downi].sum) >= min_dist {
                        down = false;
                    } else {
                        let dist = l1_distance(c, entries[downi].color);
                        if dist < min_dist {
                            min_dist = dist;
                            index = downi;
                        }
                    }
                }
            }
        }

        entries[index].index
    }

    #[inline]
    fn sum_bound(&self, pixel_sum: usize, entry_sum: i32) -> u32 {
        #[allow(clippy::cast_possible_wrap)]
        let gap = pixel_sum as i32 - entry_sum;
        self.lut_ssd[(gap + MAX_SUM as i32) as usize]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    fn brute_force(palette: &[Srgba<u8>], c: Srgba<u8>) -> u32 {
        let mut best = 0;
        let mut best_dist = u32::MAX;
        #[allow(clippy::cast_possible_truncation)]
        for (i, &p) in palette.iter().enumerate() {
            let dist = l1_distance(c, p);
            if dist < best_dist {
                best_dist = dist;
                best = i as u32;
            }
        }
        best
    }

    #[test]
    fn agrees_with_brute_force_on_random_palettes() {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(0);
        let palette: Vec<Srgba<u8>> = (0..64)
            .map(|_| Srgba::new(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>(), 255))
            .collect();
        let map = SumSortedPalette::new(&palette);

        for _ in 0..2048 {
            let c = Srgba::new(rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>(), 255);
            let found = map.nearest(c);
            let expected = brute_force(&palette, c);
            assert_eq!(
                l1_distance(c, palette[found as usize]),
                l1_distance(c, palette[expected as usize]),
            );
        }
    }

    #[test]
    fn single_entry_palette() {
        let palette = [Srgba::new(1, 2, 3, 255)];
        let map = SumSortedPalette::new(&palette);
        assert_eq!(map.nearest(Srgba::new(200, 200, 200, 255)), 0);
    }

    #[test]
    fn exact_matches_are_found() {
        let palette = [
            Srgba::new(0, 0, 0, 255),
            Srgba::new(128, 128, 128, 255),
            Srgba::new(255, 255, 255, 255),
        ];
        let map = SumSortedPalette::new(&palette);
        for (i, &p) in palette.iter().enumerate() {
            assert_eq!(map.nearest(p) as usize, i);
        }
    }
}
