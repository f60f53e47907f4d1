//! The immutable 143-item question bank.
//!
//! The bank is loaded and deserialized by the api crate at startup;
//! this module owns the shape of an item and the structural invariants
//! that make the rest of the core safe to run: exactly
//! [`FULL_QUESTION_COUNT`] items, a fixed item count per ray, and
//! unique stable ids. Violations are configuration errors and must
//! abort startup, never surface mid-request.

use serde::{Deserialize, Serialize};

/// Total number of items in the full bank. Also the size of an initial
/// (run 1) assessment.
pub const FULL_QUESTION_COUNT: usize = 143;

/// Fixed item count per ray, indexed by `Ray::index()`. Sums to 143.
pub const RAY_ITEM_COUNTS: [usize; 9] = [16, 16, 16, 16, 16, 16, 16, 16, 15];

/// One of the nine scored capacity dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Ray {
    #[serde(rename = "R1")]
    R1,
    #[serde(rename = "R2")]
    R2,
    #[serde(rename = "R3")]
    R3,
    #[serde(rename = "R4")]
    R4,
    #[serde(rename = "R5")]
    R5,
    #[serde(rename = "R6")]
    R6,
    #[serde(rename = "R7")]
    R7,
    #[serde(rename = "R8")]
    R8,
    #[serde(rename = "R9")]
    R9,
}

impl Ray {
    /// All rays in scoring order.
    pub const ALL: [Ray; 9] = [
        Ray::R1,
        Ray::R2,
        Ray::R3,
        Ray::R4,
        Ray::R5,
        Ray::R6,
        Ray::R7,
        Ray::R8,
        Ray::R9,
    ];

    /// Zero-based index into per-ray tables.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Ray::R1 => "R1",
            Ray::R2 => "R2",
            Ray::R3 => "R3",
            Ray::R4 => "R4",
            Ray::R5 => "R5",
            Ray::R6 => "R6",
            Ray::R7 => "R7",
            Ray::R8 => "R8",
            Ray::R9 => "R9",
        }
    }

    /// Expected item count for this ray in a valid bank.
    pub fn item_count(self) -> usize {
        RAY_ITEM_COUNTS[self.index()]
    }
}

impl std::fmt::Display for Ray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response polarity. Reverse-polarity items are scored inverted and
/// exist to detect response bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    Normal,
    Reverse,
}

/// Inclusive response scale bounds for an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub min: i16,
    pub max: i16,
}

impl Scale {
    pub fn contains(&self, value: i16) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A single scored item in the bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Stable id, referenced by historical runs. Never reused.
    pub id: String,
    pub ray: Ray,
    pub polarity: Polarity,
    pub scale: Scale,
    pub required: bool,
}

/// Structural invariant violation in the bank data. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum QuestionBankError {
    #[error("question bank has {actual} items, expected {expected}")]
    TotalCountMismatch { expected: usize, actual: usize },

    #[error("ray {ray} has {actual} items, expected {expected}")]
    RayCountMismatch {
        ray: Ray,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate question id: {id}")]
    DuplicateId { id: String },
}

/// The validated, frozen 143-item pool.
///
/// Items are held sorted by id so every consumer sees the same stable
/// order regardless of the order in the source data.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    items: Vec<Question>,
}

impl QuestionBank {
    /// Validate and freeze a set of items into a bank.
    pub fn new(mut items: Vec<Question>) -> Result<Self, QuestionBankError> {
        if items.len() != FULL_QUESTION_COUNT {
            return Err(QuestionBankError::TotalCountMismatch {
                expected: FULL_QUESTION_COUNT,
                actual: items.len(),
            });
        }

        items.sort_by(|a, b| a.id.cmp(&b.id));
        for pair in items.windows(2) {
            if pair[0].id == pair[1].id {
                return Err(QuestionBankError::DuplicateId {
                    id: pair[0].id.clone(),
                });
            }
        }

        for ray in Ray::ALL {
            let actual = items.iter().filter(|q| q.ray == ray).count();
            if actual != ray.item_count() {
                return Err(QuestionBankError::RayCountMismatch {
                    ray,
                    expected: ray.item_count(),
                    actual,
                });
            }
        }

        Ok(Self { items })
    }

    /// All items in id order.
    pub fn items(&self) -> &[Question] {
        &self.items
    }

    /// Items belonging to one ray, in id order.
    pub fn items_for_ray(&self, ray: Ray) -> impl Iterator<Item = &Question> {
        self.items.iter().filter(move |q| q.ray == ray)
    }

    /// The full ordered id list, as assigned to a run-1 assessment.
    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|q| q.id.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<&Question> {
        self.items
            .binary_search_by(|q| q.id.as_str().cmp(id))
            .ok()
            .map(|idx| &self.items[idx])
    }
}
