//! Order-independent digests of derived artifacts.
//!
//! Regenerating a mesh can emit the same triangles in a different order.
//! The digest sorts canonical element encodings before hashing, so only a
//! change in the geometry itself changes the result.

use crate::error::{CoreError, CoreResult};
use sha2::{Digest, Sha256};

/// Collects elements (e.g. triangles) and hashes them independent of
/// insertion order.
///
/// # Example
///
/// ```
/// use strata_core::ContentHasher;
///
/// let mut a = ContentHasher::new();
/// a.add_element(&[0.0, 1.0, 2.0]);
/// a.add_element(&[3.0, 4.0, 5.0]);
///
/// let mut b = ContentHasher::new();
/// b.add_element(&[3.0, 4.0, 5.0]);
/// b.add_element(&[0.0, 1.0, 2.0]);
///
/// assert_eq!(a.finish(), b.finish());
/// ```
#[derive(Debug, Default, Clone)]
pub struct ContentHasher {
    elements: Vec<Vec<u8>>,
}

impl ContentHasher {
    /// Creates an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one element given as its coordinates.
    ///
    /// The encoding is prefixed with the coordinate count, so splitting the
    /// same numbers into different elements changes the digest.
    pub fn add_element(&mut self, coordinates: &[f64]) {
        let mut bytes = Vec::with_capacity(8 + coordinates.len() * 8);
        bytes.extend_from_slice(&(coordinates.len() as u64).to_be_bytes());
        for &c in coordinates {
            // -0.0 and 0.0 are the same coordinate.
            let c = if c == 0.0 { 0.0 } else { c };
            bytes.extend_from_slice(&c.to_be_bytes());
        }
        self.elements.push(bytes);
    }

    /// Number of elements added.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if nothing was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Sorts the elements, hashes their length-prefixed encodings with
    /// SHA-256 and returns lowercase hex.
    #[must_use]
    pub fn finish(mut self) -> String {
        self.elements.sort_unstable();
        let mut hasher = Sha256::new();
        for element in &self.elements {
            hasher.update(element);
        }
        hex::encode(hasher.finalize())
    }

    /// Digest of an ASCII STL file.
    ///
    /// Every `vertex x y z` line contributes a point; consecutive groups of
    /// three points form a triangle. All other lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArtifact`] for a malformed vertex line or
    /// a trailing incomplete triangle.
    pub fn digest_ascii_stl(text: &str) -> CoreResult<String> {
        let mut hasher = Self::new();
        let mut triangle: Vec<f64> = Vec::with_capacity(9);
        let mut last_line = 0;

        for (index, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            if tokens.next() != Some("vertex") {
                continue;
            }
            last_line = index + 1;
            let point = tokens
                .map(str::parse::<f64>)
                .collect::<Result<Vec<f64>, _>>()
                .map_err(|e| CoreError::invalid_artifact(last_line, e.to_string()))?;
            if point.len() != 3 {
                return Err(CoreError::invalid_artifact(
                    last_line,
                    format!("expected 3 coordinates, found {}", point.len()),
                ));
            }
            triangle.extend_from_slice(&point);
            if triangle.len() == 9 {
                hasher.add_element(&triangle);
                triangle.clear();
            }
        }

        if !triangle.is_empty() {
            return Err(CoreError::invalid_artifact(last_line, "incomplete triangle"));
        }
        Ok(hasher.finish())
    }
}
