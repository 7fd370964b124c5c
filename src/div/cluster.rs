//! Divisive variance-split clustering.
//!
//! The input is split one cluster at a time: the cluster with the greatest
//! total squared error is cut at its mean along the axis of greatest
//! variance, optionally refined by a few local k-means iterations. Cluster
//! statistics are maintained incrementally through the combined-mean and
//! combined-variance identities rather than recomputed from scratch.

// Referenced paper:
// M. E. Celebi, Q. Wen, S. Hwang, An effective real-time color quantization
// method based on divisive hierarchical clustering,
// Journal of Real-Time Image Processing, vol. 10, 329-344, 2015.

use crate::{pixel::components, Error};
use log::warn;
use num_traits::AsPrimitive;
use palette::Srgba;

#[inline]
fn sqr(x: f64) -> f64 {
    x * x
}

/// Weighted mean and variance of the full data set, per channel.
fn initial_mean_and_var(
    data: &[Srgba<u8>],
    weights: Option<&[f64]>,
    data_weight: f64,
) -> ([f64; 4], [f64; 4]) {
    let mut mean = [0.0; 4];
    let mut var = [0.0; 4];

    match weights {
        None => {
            for &color in data {
                let c = components(color);
                for ch in 0..4 {
                    mean[ch] += c[ch];
                    var[ch] += sqr(c[ch]);
                }
            }
            // In the uniform-weight case the multiply hoists outside the loop.
            for ch in 0..4 {
                mean[ch] *= data_weight;
                var[ch] *= data_weight;
            }
        }
        Some(weights) => {
            for (&color, &w) in data.iter().zip(weights) {
                let c = components(color);
                for ch in 0..4 {
                    mean[ch] += w * c[ch];
                    var[ch] += w * sqr(c[ch]);
                }
            }
        }
    }

    for ch in 0..4 {
        var[ch] -= sqr(mean[ch]);
    }

    (mean, var)
}

/// Runs the divisive clustering over `data`, producing at most `k` palette
/// entries.
///
/// `weights` carries one weight per point; when absent every point weighs
/// `data_weight`. `num_bits` is the precision the data was cut to; emitted
/// centroids are shifted back up by `8 - num_bits`. `max_iters` is the
/// number of local k-means refinement passes per split (zero disables
/// refinement). The member type `M` must be wide enough to hold `k - 1`.
///
/// Empty clusters are skipped on emission, so fewer than `k` entries may
/// come back.
///
/// # Errors
/// Returns [`Error::InvalidArgument`] for an empty input or a `num_bits`
/// outside `[1, 8]`, and [`Error::InternalError`] when a cluster compaction
/// does not match the bookkept cluster size.
#[allow(
    clippy::too_many_lines,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss
)]
pub(crate) fn cluster_colors<M>(
    data: &[Srgba<u8>],
    weights: Option<&[f64]>,
    data_weight: f64,
    num_bits: u8,
    max_iters: u32,
    k: u32,
) -> Result<Vec<Srgba<u8>>, Error>
where
    M: Copy + Default + AsPrimitive<u32> + 'static,
    u32: AsPrimitive<M>,
{
    if data.is_empty() {
        return Err(Error::InvalidArgument("no colors to cluster"));
    }
    if !(1..=8).contains(&num_bits) {
        return Err(Error::InvalidArgument("color precision must be in [1, 8]"));
    }

    let num_points = data.len();
    let k = k as usize;
    let apply_lkm = max_iters > 0;

    // Membership of every point; all points start in cluster 0.
    let mut member: Vec<M> = vec![M::default(); num_points];

    let mut weight = vec![0.0f64; k];
    // The size of a cluster is the number of unique colors it represents,
    // not the number of pixels.
    let mut size = vec![0usize; k];
    let mut tse = vec![0.0f64; k];
    let mut mean = vec![[0.0f64; 4]; k];
    let mut var = vec![[0.0f64; 4]; k];

    // Index of the cluster being split; cluster 0 is always first.
    let mut old_index = 0usize;
    weight[old_index] = 1.0;
    size[old_index] = num_points;
    let mut tmp_num_points = num_points;

    // Compacted copy of the cluster under split, with the original position
    // of each point. Allocated lazily after the first split.
    let mut compacted: Option<(Vec<Srgba<u8>>, Vec<u32>)> = None;

    for new_index in 1..k {
        let total_weight = weight[old_index];

        let (total_mean, total_var) = if new_index == 1 {
            initial_mean_and_var(data, weights, data_weight)
        } else {
            (mean[old_index], var[old_index])
        };

        // Cutting axis: the channel with the greatest variance, first one
        // winning ties in alpha, red, green, blue order.
        let mut max_val = total_var[0];
        let mut cut_axis = 0usize;
        let mut cut_pos = total_mean[0];
        for ch in 1..4 {
            if max_val < total_var[ch] {
                max_val = total_var[ch];
                cut_axis = ch;
                cut_pos = total_mean[ch];
            }
        }

        let points: &[Srgba<u8>] = compacted.as_ref().map_or(data, |(points, _)| points);
        let point_at = |ip: usize| -> usize {
            compacted
                .as_ref()
                .map_or(ip, |(_, original)| original[ip] as usize)
        };

        let mut new_weight = 0.0f64;
        let mut new_weight_count = 0usize;
        let mut new_size = 0usize;
        let mut new_mean = [0.0f64; 4];
        let mut new_var = [0.0f64; 4];

        // Split at the mean: points strictly above the cut join the new
        // cluster, the rest stay put.
        for ip in 0..tmp_num_points {
            let c = components(points[ip]);
            if cut_pos < c[cut_axis] {
                let mut tmp_weight = data_weight;
                match weights {
                    None => {
                        for ch in 0..4 {
                            new_mean[ch] += c[ch];
                        }
                        new_weight_count += 1;
                    }
                    Some(weights) => {
                        tmp_weight = weights[point_at(ip)];
                        for ch in 0..4 {
                            new_mean[ch] += tmp_weight * c[ch];
                        }
                        new_weight += tmp_weight;
                    }
                }

                if !apply_lkm {
                    member[point_at(ip)] = (new_index as u32).as_();
                    match weights {
                        None => {
                            for ch in 0..4 {
                                new_var[ch] += sqr(c[ch]);
                            }
                        }
                        Some(_) => {
                            for ch in 0..4 {
                                new_var[ch] += tmp_weight * sqr(c[ch]);
                            }
                        }
                    }
                    new_size += 1;
                }
            }
        }

        if weights.is_none() {
            for ch in 0..4 {
                new_mean[ch] *= data_weight;
                new_var[ch] *= data_weight;
            }
            new_weight = new_weight_count as f64 * data_weight;
        }

        let mut old_weight = total_weight - new_weight;
        for ch in 0..4 {
            new_mean[ch] /= new_weight;
        }

        // Mean of the remaining half via the combined-mean identity.
        let mut old_mean = [0.0f64; 4];
        for ch in 0..4 {
            old_mean[ch] = (total_weight * total_mean[ch] - new_weight * new_mean[ch]) / old_weight;
        }

        // Local k-means refinement: reassign each point to the nearer of the
        // two fresh centroids by the half-plane test, then update the means.
        for it in 0..max_iters {
            let last_iter = it + 1 == max_iters;

            let lhs = 0.5
                * (sqr(old_mean[0]) - sqr(new_mean[0]) + sqr(old_mean[1]) - sqr(new_mean[1])
                    + sqr(old_mean[2])
                    - sqr(new_mean[2])
                    + sqr(old_mean[3])
                    - sqr(new_mean[3]));
            let mut rhs = [0.0f64; 4];
            for ch in 0..4 {
                rhs[ch] = old_mean[ch] - new_mean[ch];
            }

            new_weight = 0.0;
            new_size = 0;
            new_mean = [0.0; 4];
            new_var = [0.0; 4];

            for ip in 0..tmp_num_points {
                let c = components(points[ip]);
                let point = point_at(ip);
                let tmp_weight = weights.map_or(data_weight, |weights| weights[point]);

                if lhs < rhs[0] * c[0] + rhs[1] * c[1] + rhs[2] * c[2] + rhs[3] * c[3] {
                    if last_iter {
                        member[point] = (old_index as u32).as_();
                    }
                } else {
                    match (weights, last_iter) {
                        (None, false) => {
                            for ch in 0..4 {
                                new_mean[ch] += c[ch];
                            }
                        }
                        (None, true) => {
                            for ch in 0..4 {
                                new_mean[ch] += c[ch];
                                new_var[ch] += sqr(c[ch]);
                            }
                        }
                        (Some(_), false) => {
                            for ch in 0..4 {
                                new_mean[ch] += tmp_weight * c[ch];
                            }
                        }
                        (Some(_), true) => {
                            for ch in 0..4 {
                                new_mean[ch] += tmp_weight * c[ch];
                                new_var[ch] += tmp_weight * sqr(c[ch]);
                            }
                        }
                    }
                    if last_iter {
                        member[point] = (new_index as u32).as_();
                    }
                    if weights.is_some() {
                        new_weight += tmp_weight;
                    }
                    new_size += 1;
                }
            }

            if weights.is_none() {
                for ch in 0..4 {
                    new_mean[ch] *= data_weight;
                    new_var[ch] *= data_weight;
                }
                new_weight = new_size as f64 * data_weight;
            }

            for ch in 0..4 {
                new_mean[ch] /= new_weight;
            }
            old_weight = total_weight - new_weight;
            for ch in 0..4 {
                old_mean[ch] =
                    (total_weight * total_mean[ch] - new_weight * new_mean[ch]) / old_weight;
            }
        }

        mean[new_index] = new_mean;
        mean[old_index] = old_mean;
        size[old_index] = tmp_num_points - new_size;
        size[new_index] = new_size;

        if new_index == k - 1 {
            // Last split; no further cluster needs to be selected.
            break;
        }

        // Variance of the new cluster: sum{w x^2} / sum{w} - mean^2.
        for ch in 0..4 {
            var[new_index][ch] = new_var[ch] / new_weight - sqr(new_mean[ch]);
        }
        // Variance of the old cluster via the combined-variance identity.
        for ch in 0..4 {
            var[old_index][ch] = (total_weight * total_var[ch]
                - new_weight * (var[new_index][ch] + sqr(new_mean[ch] - total_mean[ch])))
                / old_weight
                - sqr(old_mean[ch] - total_mean[ch]);
        }

        weight[old_index] = old_weight;
        weight[new_index] = new_weight;

        tse[old_index] =
            old_weight * (var[old_index][0] + var[old_index][1] + var[old_index][2] + var[old_index][3]);
        tse[new_index] =
            new_weight * (var[new_index][0] + var[new_index][1] + var[new_index][2] + var[new_index][3]);

        // Next to split: the cluster with the greatest total squared error,
        // lowest index winning ties. Seeding with the smallest positive
        // double keeps the previous selection when every error is zero.
        let mut max_tse = f64::MIN_POSITIVE;
        for (ic, &e) in tse.iter().enumerate().take(new_index + 1) {
            if max_tse < e {
                max_tse = e;
                old_index = ic;
            }
        }
        tmp_num_points = size[old_index];

        // Gather the points of the chosen cluster into the scratch buffer,
        // sized once for the larger half of the first split.
        let larger = size[0].max(size[1]);
        let (points, original) = compacted
            .get_or_insert_with(|| (Vec::with_capacity(larger), Vec::with_capacity(larger)));
        points.clear();
        original.clear();
        for (ip, m) in member.iter().enumerate() {
            if m.as_() == old_index as u32 {
                points.push(data[ip]);
                #[allow(clippy::cast_possible_truncation)]
                original.push(ip as u32);
            }
        }
        if points.len() != tmp_num_points {
            return Err(Error::InternalError(format!(
                "cluster to be split is expected to be of size {tmp_num_points}, not {}",
                points.len()
            )));
        }
    }

    // Final cluster centers, restored to full precision. Empty clusters
    // are dropped.
    let shift = 8 - num_bits;
    let mut palette = Vec::with_capacity(k);
    let mut num_empty = 0usize;
    for ic in 0..k {
        if size[ic] > 0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let [a, r, g, b] = mean[ic].map(|m| (u32::from((m + 0.5) as u8) << shift) as u8);
            palette.push(Srgba::new(r, g, b, a));
        } else {
            num_empty += 1;
        }
    }

    if num_empty > 0 {
        warn!("{num_empty} empty clusters");
    }

    Ok(palette)
}
