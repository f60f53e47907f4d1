//! Retake set selection.
//!
//! Recurring runs (`run_number > 1`) use a reduced 43-item subset of
//! the bank with a fixed quota per ray and a minimum number of
//! reverse-polarity items per ray, so response-bias detection survives
//! the cut. Selection is pure and deterministic: the same bank always
//! yields the same ordered set. It runs once at process startup; the
//! result is frozen for the process lifetime.

use crate::question_bank::{Polarity, Question, QuestionBank, Ray};

/// Size of the retake set.
pub const RETAKE_QUESTION_COUNT: usize = 43;

/// Per-ray retake quotas, indexed by `Ray::index()`. Sums to 43.
pub const RETAKE_QUOTAS: [usize; 9] = [5, 5, 5, 5, 5, 5, 5, 4, 4];

impl Ray {
    /// Number of items this ray contributes to the retake set.
    pub fn retake_quota(self) -> usize {
        RETAKE_QUOTAS[self.index()]
    }

    /// Minimum reverse-polarity items in this ray's retake picks.
    pub fn reverse_target(self) -> usize {
        if self.retake_quota() >= 5 {
            2
        } else {
            1
        }
    }
}

/// Selection failure. All variants are configuration errors: the bank
/// data cannot satisfy the quota table and startup must abort. The
/// per-ray variants localize the bad data immediately instead of
/// leaving a generic size mismatch to debug.
#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("ray {ray} has {available} items, fewer than its quota of {quota}")]
    RayPoolTooSmall {
        ray: Ray,
        quota: usize,
        available: usize,
    },

    #[error("retake selection for ray {ray} produced {actual} items, expected {expected}")]
    RayQuotaMismatch {
        ray: Ray,
        expected: usize,
        actual: usize,
    },

    #[error("retake set has {actual} items, expected {expected}")]
    SetSizeMismatch { expected: usize, actual: usize },
}

/// Pick `count` items evenly spread across `items`.
///
/// Uses the index formula `round(i * (n-1) / (count-1))`, which always
/// includes the first and last candidate and never clusters picks at
/// one end of the id range.
fn pick_spread<'a>(items: &[&'a Question], count: usize) -> Vec<&'a Question> {
    if count == 0 || items.is_empty() {
        return Vec::new();
    }
    if count >= items.len() {
        return items.to_vec();
    }
    if count == 1 {
        return vec![items[0]];
    }

    let last_index = (items.len() - 1) as f64;
    let step = last_index / (count - 1) as f64;
    (0..count)
        .map(|i| items[(i as f64 * step).round() as usize])
        .collect()
}

/// Select one ray's retake picks: spread samples from the normal and
/// reverse lists, topped up from the remaining items in id order if
/// the polarity split under-fills the quota.
fn pick_for_ray<'a>(
    ray_items: &[&'a Question],
    ray: Ray,
) -> Result<Vec<&'a Question>, SelectionError> {
    let quota = ray.retake_quota();
    if ray_items.len() < quota {
        return Err(SelectionError::RayPoolTooSmall {
            ray,
            quota,
            available: ray_items.len(),
        });
    }

    let normal: Vec<&Question> = ray_items
        .iter()
        .copied()
        .filter(|q| q.polarity == Polarity::Normal)
        .collect();
    let reverse: Vec<&Question> = ray_items
        .iter()
        .copied()
        .filter(|q| q.polarity == Polarity::Reverse)
        .collect();

    let reverse_target = ray.reverse_target();
    let normal_target = quota.saturating_sub(reverse_target);

    let mut picks = pick_spread(&normal, normal_target);
    picks.extend(pick_spread(&reverse, reverse_target));

    if picks.len() < quota {
        let picked: std::collections::HashSet<&str> =
            picks.iter().map(|q| q.id.as_str()).collect();
        for q in ray_items {
            if picks.len() == quota {
                break;
            }
            if !picked.contains(q.id.as_str()) {
                picks.push(q);
            }
        }
    }

    picks.truncate(quota);
    picks.sort_by(|a, b| a.id.cmp(&b.id));

    if picks.len() != quota {
        return Err(SelectionError::RayQuotaMismatch {
            ray,
            expected: quota,
            actual: picks.len(),
        });
    }

    Ok(picks)
}

/// Build the 43-item retake set from a validated bank.
///
/// Returns the selected ids sorted by id. Per-ray selection cannot
/// pick the same id twice, so the final dedupe is expected to be a
/// no-op.
pub fn build_retake_set(bank: &QuestionBank) -> Result<Vec<String>, SelectionError> {
    let mut selected: Vec<&Question> = Vec::with_capacity(RETAKE_QUESTION_COUNT);

    for ray in Ray::ALL {
        let ray_items: Vec<&Question> = bank.items_for_ray(ray).collect();
        selected.extend(pick_for_ray(&ray_items, ray)?);
    }

    selected.sort_by(|a, b| a.id.cmp(&b.id));
    selected.dedup_by(|a, b| a.id == b.id);

    if selected.len() != RETAKE_QUESTION_COUNT {
        return Err(SelectionError::SetSizeMismatch {
            expected: RETAKE_QUESTION_COUNT,
            actual: selected.len(),
        });
    }

    Ok(selected.iter().map(|q| q.id.clone()).collect())
}
