//! Categorical raster encoding.
//!
//! Raw land-use and soil codes are arbitrary integers. They are replaced by
//! dense 1-based indices assigned in ascending code order, so parameter
//! tables can be flat arrays.

use crate::error::{Result, WaterBalanceError};

/// Raw category code from an input raster.
pub type Code = i32;

/// Bijection between codes and dense indices `1..=K`.
///
/// Stored as the sorted distinct codes: index `i` maps to `codes[i - 1]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    codes: Vec<Code>,
}

impl Mapping {
    /// Rebuild a mapping from its sorted code list.
    ///
    /// Codes must be strictly ascending, as produced by [`encode`].
    pub fn from_sorted_codes(codes: Vec<Code>) -> Result<Self> {
        if let Some(w) = codes.windows(2).find(|w| w[0] >= w[1]) {
            return Err(WaterBalanceError::MalformedMapping(format!(
                "codes must be strictly ascending, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(Self { codes })
    }

    /// Number of distinct codes (K).
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Returns `true` if the mapping has no entries.
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Largest index assigned (equal to K).
    pub fn max_index(&self) -> u32 {
        self.codes.len() as u32
    }

    /// Index assigned to `code`, if present.
    pub fn index_of(&self, code: Code) -> Option<u32> {
        self.codes
            .binary_search(&code)
            .ok()
            .map(|pos| pos as u32 + 1)
    }

    /// Code behind `index`, if in `1..=K`.
    pub fn code_of(&self, index: u32) -> Option<Code> {
        let pos = (index as usize).checked_sub(1)?;
        self.codes.get(pos).copied()
    }

    /// Sorted distinct codes.
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// Iterate `(index, code)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, Code)> + '_ {
        self.codes
            .iter()
            .enumerate()
            .map(|(pos, &code)| (pos as u32 + 1, code))
    }
}

/// Encode raw codes into dense indices.
///
/// Returns the index array (same length as `codes`) and the mapping.
/// Empty input yields an empty mapping.
pub fn encode(codes: &[Code]) -> (Vec<u32>, Mapping) {
    let mut distinct = codes.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    let mapping = Mapping { codes: distinct };

    let indices = codes
        .iter()
        .map(|&c| {
            // Every code is in `distinct`, so the search always hits.
            mapping.codes.binary_search(&c).map_or(0, |pos| pos as u32 + 1)
        })
        .collect();

    (indices, mapping)
}

/// Dense index grid in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexGrid {
    pub rows: usize,
    pub cols: usize,
    pub indices: Vec<u32>,
}

impl IndexGrid {
    /// Wrap an index vector, checking it matches `rows * cols`.
    pub fn new(rows: usize, cols: usize, indices: Vec<u32>) -> Result<Self> {
        check_shape(rows, cols, indices.len())?;
        Ok(Self {
            rows,
            cols,
            indices,
        })
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns `true` for a grid with no cells.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Largest index present (0 for an empty grid).
    pub fn max_index(&self) -> u32 {
        self.indices.iter().copied().max().unwrap_or(0)
    }
}

/// A categorical raster after encoding: index grid plus mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRaster {
    pub grid: IndexGrid,
    pub mapping: Mapping,
}

impl EncodedRaster {
    /// Encode a row-major code raster of shape `rows x cols`.
    pub fn from_codes(rows: usize, cols: usize, codes: &[Code]) -> Result<Self> {
        check_shape(rows, cols, codes.len())?;
        let (indices, mapping) = encode(codes);
        Ok(Self {
            grid: IndexGrid {
                rows,
                cols,
                indices,
            },
            mapping,
        })
    }

    /// Map every index back to its original code.
    pub fn decode(&self) -> Vec<Code> {
        self.grid
            .indices
            .iter()
            .map(|&i| self.mapping.code_of(i).unwrap_or_default())
            .collect()
    }
}

fn check_shape(rows: usize, cols: usize, len: usize) -> Result<()> {
    if rows * cols != len {
        return Err(WaterBalanceError::shape_mismatch(
            format!("{rows}x{cols} = {} cells", rows * cols),
            format!("{len} values"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_indices_in_ascending_code_order() {
        let (idx, mapping) = encode(&[40, 10, 30, 10, 40]);
        assert_eq!(mapping.codes(), &[10, 30, 40]);
        assert_eq!(idx, vec![3, 1, 2, 1, 3]);
    }

    #[test]
    fn indices_are_contiguous_from_one() {
        let codes = [7, -2, 7, 1000, 55, -2, 3];
        let (idx, mapping) = encode(&codes);
        let k = mapping.max_index();
        assert_eq!(k, 5);
        let mut seen: Vec<u32> = idx.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, (1..=k).collect::<Vec<_>>());
    }

    #[test]
    fn decoding_recovers_every_code() {
        let codes = [5, 3, 3, 9, 1, 5, 9, 9, 2, 0, -4, 3];
        let raster = EncodedRaster::from_codes(3, 4, &codes).unwrap();
        assert_eq!(raster.decode(), codes.to_vec());
        for (index, code) in raster.mapping.iter() {
            assert_eq!(raster.mapping.index_of(code), Some(index));
        }
    }

    #[test]
    fn encoding_is_deterministic() {
        let codes = [12, 4, 4, 8, 12, 1];
        assert_eq!(encode(&codes), encode(&codes));
    }

    #[test]
    fn empty_input_yields_empty_mapping() {
        let (idx, mapping) = encode(&[]);
        assert!(idx.is_empty());
        assert!(mapping.is_empty());
        assert_eq!(mapping.max_index(), 0);
    }

    #[test]
    fn code_of_out_of_range() {
        let (_, mapping) = encode(&[1, 2]);
        assert_eq!(mapping.code_of(0), None);
        assert_eq!(mapping.code_of(3), None);
        assert_eq!(mapping.index_of(99), None);
    }

    #[test]
    fn rejects_shape_mismatch() {
        let err = EncodedRaster::from_codes(2, 3, &[1, 2, 3, 4, 5]).unwrap_err();
        assert!(matches!(err, WaterBalanceError::ShapeMismatch { .. }));
        assert!(IndexGrid::new(2, 2, vec![1; 3]).is_err());
    }

    #[test]
    fn from_sorted_codes_validates_order() {
        assert!(Mapping::from_sorted_codes(vec![1, 4, 9]).is_ok());
        assert!(Mapping::from_sorted_codes(vec![1, 1, 9]).is_err());
        assert!(Mapping::from_sorted_codes(vec![9, 4]).is_err());
    }
}
