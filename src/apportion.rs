//! Integer apportionment by the Hamilton (largest remainder) method.
//!
//! Splits an integer across weighted buckets so that every share is a non-negative integer,
//! the shares sum exactly to the input, and no share is more than one away from its exact
//! proportional value.

/// Weight used for apportionment: negative and non-finite weights count as zero.
#[inline]
fn clean(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 { weight } else { 0.0 }
}

/// Split `value` across `weights` by largest remainder.
///
/// Each bucket first receives `floor(value * w / sum(w))`; the units left over go one at a
/// time to the buckets with the largest fractional remainders, ties going to the bucket that
/// comes first in `weights`. If every weight is zero the whole value goes to the first bucket.
/// An empty bucket list yields an empty result.
///
/// Panics if the shares do not sum to `value`, which would be a bug in this function.
pub fn apportion<K: Clone>(value: u64, weights: &[(K, f64)]) -> Vec<(K, u64)> {
    if weights.is_empty() { return Vec::new() }

    let total: f64 = weights.iter().map(|(_, w)| clean(*w)).sum();
    if total <= 0.0 {
        return weights.iter().enumerate()
            .map(|(i, (key, _))| (key.clone(), if i == 0 { value } else { 0 }))
            .collect();
    }

    let exact = weights.iter()
        .map(|(_, w)| value as f64 * (clean(*w) / total))
        .collect::<Vec<_>>();
    let mut shares = exact.iter()
        .map(|share| share.floor() as u64)
        .collect::<Vec<_>>();
    let remainders = exact.iter().zip(&shares)
        .map(|(exact, &share)| exact - share as f64)
        .collect::<Vec<_>>();

    // Stable sort: equal remainders keep their original order.
    let mut order = (0..weights.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| remainders[b].total_cmp(&remainders[a]));

    let provisional: u64 = shares.iter().sum();
    if provisional <= value {
        // The deficit is below the bucket count unless `value` exceeds f64 precision.
        let deficit = (value - provisional) as usize;
        for &i in order.iter().cycle().take(deficit) {
            shares[i] += 1;
        }
    } else {
        // Only reachable through float rounding on huge values: take back from the smallest remainders.
        let mut surplus = provisional - value;
        for &i in order.iter().rev().cycle() {
            if surplus == 0 { break }
            if shares[i] > 0 {
                shares[i] -= 1;
                surplus -= 1;
            }
        }
    }

    let sum: u64 = shares.iter().sum();
    assert_eq!(sum, value, "apportionment imbalance: shares {shares:?} do not sum to {value}");

    weights.iter().zip(shares)
        .map(|((key, _), share)| (key.clone(), share))
        .collect()
}

/// [`apportion`] for signed values: the magnitude is apportioned and the sign reapplied,
/// so shares of a negative value are all non-positive and still sum exactly to it.
pub fn apportion_signed<K: Clone>(value: i64, weights: &[(K, f64)]) -> Vec<(K, i64)> {
    let negative = value < 0;
    apportion(value.unsigned_abs(), weights).into_iter()
        .map(|(key, share)| {
            // A share never exceeds the magnitude, so it fits back into i64 with its sign.
            let share = if negative { 0i64.wrapping_sub_unsigned(share) } else { share as i64 };
            (key, share)
        })
        .collect()
}

/// Split a non-integer value by weight share, rounding each share to `decimals` places.
/// Sums are preserved only up to rounding. Zero total weight sends everything to the first bucket.
pub fn split_proportional<K: Clone>(value: f64, weights: &[(K, f64)], decimals: u32) -> Vec<(K, f64)> {
    let total: f64 = weights.iter().map(|(_, w)| clean(*w)).sum();
    let scale = 10f64.powi(decimals as i32);

    weights.iter().enumerate()
        .map(|(i, (key, w))| {
            let fraction = if total > 0.0 { clean(*w) / total } else if i == 0 { 1.0 } else { 0.0 };
            (key.clone(), (value * fraction * scale).round() / scale)
        })
        .collect()
}
