//! Marker dictionary: 4×4-bit payload codewords keyed by marker id.
//!
//! Dictionary JSON follows schema `magsteer.markers.v1`. Payload bits are read
//! row-major, most significant bit first, white cell = 1.

use std::path::Path;

const MARKER_SCHEMA_V1: &str = "magsteer.markers.v1";

/// Payload grid side in cells.
pub const PAYLOAD_SIDE: usize = 4;

/// Coil marker codewords. Pairwise and rotational Hamming distance is ≥ 6.
const DEFAULT_MARKERS: [(u32, u16); 4] = [(10, 0x474B), (17, 0xDE1C), (34, 0x63BD), (37, 0x6C0D)];

/// Smallest rotational Hamming distance a loaded dictionary must keep.
const MIN_SAFE_DISTANCE: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MarkerEntry {
    pub id: u32,
    pub code: u16,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct MarkerDictionarySpecV1 {
    schema: String,
    markers: Vec<MarkerEntry>,
}

/// Best dictionary match for an observed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryMatch {
    pub id: u32,
    /// Hamming distance between the observed word and the codeword.
    pub distance: u32,
}

#[derive(Debug, Clone)]
pub struct MarkerDictionary {
    entries: Vec<MarkerEntry>,
}

impl Default for MarkerDictionary {
    fn default() -> Self {
        Self {
            entries: DEFAULT_MARKERS
                .iter()
                .map(|&(id, code)| MarkerEntry { id, code })
                .collect(),
        }
    }
}

impl MarkerDictionary {
    /// Load a dictionary from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let spec: MarkerDictionarySpecV1 = serde_json::from_str(&data)?;
        Self::from_spec(spec).map_err(Into::into)
    }

    fn from_spec(spec: MarkerDictionarySpecV1) -> Result<Self, String> {
        if spec.schema != MARKER_SCHEMA_V1 {
            return Err(format!(
                "unsupported marker schema '{}' (expected '{}')",
                spec.schema, MARKER_SCHEMA_V1
            ));
        }
        let dict = Self {
            entries: spec.markers,
        };
        validate_dictionary(&dict)?;
        Ok(dict)
    }

    pub fn entries(&self) -> &[MarkerEntry] {
        &self.entries
    }

    pub fn code(&self, id: u32) -> Option<u16> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.code)
    }

    /// Closest codeword to `word` (no rotation search; the detector handles
    /// orientation by trying every corner ordering).
    pub fn match_word(&self, word: u16) -> Option<DictionaryMatch> {
        self.entries
            .iter()
            .map(|e| DictionaryMatch {
                id: e.id,
                distance: (e.code ^ word).count_ones(),
            })
            .min_by_key(|m| m.distance)
    }

    /// Minimum Hamming distance over every pair of codewords in every
    /// rotation, including each codeword against its own rotations.
    pub fn min_rotational_distance(&self) -> u32 {
        let mut best = u32::MAX;
        for (i, a) in self.entries.iter().enumerate() {
            let mut r = a.code;
            for _ in 0..3 {
                r = rotate_word_cw(r);
                best = best.min((a.code ^ r).count_ones());
            }
            for b in &self.entries[i + 1..] {
                let mut r = b.code;
                for _ in 0..4 {
                    best = best.min((a.code ^ r).count_ones());
                    r = rotate_word_cw(r);
                }
            }
        }
        best
    }
}

fn validate_dictionary(dict: &MarkerDictionary) -> Result<(), String> {
    if dict.entries.is_empty() {
        return Err("marker dictionary must not be empty".to_string());
    }
    for (i, e) in dict.entries.iter().enumerate() {
        if dict.entries[i + 1..].iter().any(|o| o.id == e.id) {
            return Err(format!("duplicate marker id {}", e.id));
        }
    }
    let d = dict.min_rotational_distance();
    if d < MIN_SAFE_DISTANCE {
        return Err(format!(
            "marker codewords too similar: min rotational distance {} < {}",
            d, MIN_SAFE_DISTANCE
        ));
    }
    Ok(())
}

/// Bit of `word` at payload cell `(row, col)`.
#[inline]
pub fn payload_bit(word: u16, row: usize, col: usize) -> bool {
    (word >> (15 - (row * PAYLOAD_SIDE + col))) & 1 == 1
}

/// Rotate a 4×4 payload a quarter turn clockwise.
pub fn rotate_word_cw(word: u16) -> u16 {
    let mut out = 0u16;
    for r in 0..PAYLOAD_SIDE {
        for c in 0..PAYLOAD_SIDE {
            let bit = payload_bit(word, PAYLOAD_SIDE - 1 - c, r);
            out = (out << 1) | bit as u16;
        }
    }
    out
}
