//! Palette emission and nearest-color search for the trained map.
//!
//! The trained neurons are converted to colors and selection-sorted by
//! green, with a per-green-value bucket table built along the way. Lookups
//! scan the palette for the two closest entries and pick between them with
//! probability proportional to the opposite distance, which breaks up
//! banding in flat regions. Scan results are memoized per color.

use super::network::{Closest, SomNetwork, GAMMA_CORRECTION, MAXNETPOS, NETSIZE};
use crate::pixel::{l1_distance, pack};
use palette::Srgba;
use rand::RngCore;

impl SomNetwork {
    /// Index into the bias table for a neuron channel value.
    fn unbias_index(&self, value: f64) -> usize {
        if value < 0.0 {
            return 0;
        }
        let value = (value / 255.0).powf(GAMMA_CORRECTION) * f64::from(u8::MAX);
        let value = (value / 255.0 * 256.0).floor();
        if value > f64::from(u8::MAX) {
            usize::from(u8::MAX)
        } else {
            value as usize
        }
    }

    /// A neuron alpha rounded into `[0, 255]`.
    fn round_biased(value: f64) -> u8 {
        if value < 0.0 {
            return 0;
        }
        let value = (value / 255.0 * 256.0).floor();
        if value > f64::from(u8::MAX) {
            u8::MAX
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                value as u8
            }
        }
    }

    /// Converts the trained neurons into the palette, sorts it ascending by
    /// green, and fills the green-keyed bucket table.
    ///
    /// When the image has a fully transparent pixel, entry 0 is reserved
    /// for its color.
    pub(crate) fn build_index(&mut self) {
        let mut colormap = vec![Srgba::new(0u8, 0, 0, 0); NETSIZE];

        let start = usize::from(self.transparency.transparent_index.is_some());
        for k in start..NETSIZE {
            let n = self.network[k];
            let alpha = Self::round_biased(n.al);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                colormap[k] = Srgba::new(
                    self.biasvalue(self.unbias_index(n.r)) as u8,
                    self.biasvalue(self.unbias_index(n.g)) as u8,
                    self.biasvalue(self.unbias_index(n.b)) as u8,
                    alpha,
                );
            }
        }
        if start > 0 {
            colormap[0] = self.transparency.transparent_color;
        }

        // Selection sort on green, recording for every green value the
        // palette region where entries of that green start.
        let mut previous_green = 0usize;
        let mut start_pos = 0usize;
        for i in 0..NETSIZE {
            let mut small_pos = i;
            let mut small_val = usize::from(colormap[i].green);
            for j in i + 1..NETSIZE {
                if usize::from(colormap[j].green) < small_val {
                    small_pos = j;
                    small_val = usize::from(colormap[j].green);
                }
            }
            if i != small_pos {
                colormap.swap(i, small_pos);
            }

            if small_val != previous_green {
                self.netindex[previous_green] = (start_pos + i) >> 1;
                for slot in &mut self.netindex[previous_green + 1..small_val] {
                    *slot = i;
                }
                previous_green = small_val;
                start_pos = i;
            }
        }
        self.netindex[previous_green] = (start_pos + MAXNETPOS) >> 1;
        for slot in &mut self.netindex[previous_green + 1..NETSIZE] {
            *slot = MAXNETPOS;
        }

        self.colormap = colormap;
    }

    /// The first `max_colors` palette entries.
    pub(crate) fn palette(&self, max_colors: usize) -> Vec<Srgba<u8>> {
        self.colormap[..max_colors.min(NETSIZE)].to_vec()
    }

    /// Maps a color to a palette position among the first `max_colors`
    /// entries.
    ///
    /// The two nearest entries are found (memoized per color) and the
    /// winner drawn with probability proportional to the distance of the
    /// loser, so colors sitting between two entries alternate between them.
    pub(crate) fn search(&mut self, c: Srgba<u8>, max_colors: usize) -> u16 {
        let key = pack(c);
        let closest = match self.closest.get(&key) {
            Some(&closest) => closest,
            None => {
                let mut first = 0u16;
                let mut second = 0u16;
                let mut first_dist = i32::from(i16::MAX);
                let mut second_dist = first_dist;

                #[allow(clippy::cast_possible_truncation)]
                for k in 0..max_colors.min(self.colormap.len()) {
                    let dist = l1_distance(c, self.colormap[k]) as i32;
                    if dist < first_dist {
                        second = first;
                        second_dist = first_dist;
                        first = k as u16;
                        first_dist = dist;
                    } else if dist < second_dist {
                        second = k as u16;
                        second_dist = dist;
                    }
                }

                // With no usable runner-up, always take the winner.
                if second_dist == i32::from(i16::MAX) {
                    first_dist = 0;
                }

                Closest { first, second, first_dist, second_dist }
            }
        };

        #[allow(clippy::cast_sign_loss)]
        let pick = if closest.first_dist == 0
            || (self.rng.next_u32() % (closest.second_dist + closest.first_dist) as u32) as i32
                <= closest.second_dist
        {
            closest.first
        } else {
            closest.second
        };

        self.closest.insert(key, closest);
        pick
    }
}
