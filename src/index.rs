use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io::{self, Read, Write};

use ordered_float::OrderedFloat;

use crate::error::{Error, Result};
use crate::vector::squared_euclidean;

/// Nearest-neighbor index over fixed-width f32 vectors.
///
/// Positions are assigned by insertion order, starting at 0, and are never
/// reused: the caller keeps records in a parallel sequence and joins on
/// position. Distances are squared Euclidean (lower is closer).
pub trait VectorIndex: Send + Sync {
    /// Append a batch of vectors in call order.
    ///
    /// All-or-nothing: every vector is checked against the index dimension
    /// before anything is stored, so a bad batch never moves the position
    /// counter.
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

    /// The `k` nearest stored vectors as `(position, squared distance)`,
    /// closest first. Equal distances rank the earlier position first.
    /// Asking for more neighbors than stored returns everything; an empty
    /// index returns an empty list.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Number of stored vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector width this index was constructed with.
    fn dimension(&self) -> usize;

    /// Serialize the index into its binary artifact form.
    fn write_to(&self, writer: &mut dyn Write) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Candidate {
    dist: OrderedFloat<f32>,
    position: usize,
}

// Natural order, ties broken by position: the heap top is always the
// worst candidate currently retained, so equal-distance latecomers never
// displace an earlier position.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then_with(|| self.position.cmp(&other.position))
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Artifact layout, all little-endian:
//   magic "MVX1" | version u16 | dimension u32 | count u32 | count*dimension f32
const INDEX_MAGIC: &[u8; 4] = b"MVX1";
const INDEX_VERSION: u16 = 1;

// Upper bound on the floats reserved up front when loading an artifact.
// The declared count must not size the allocation on its own; a short
// payload still surfaces through the per-element reads.
const MAX_PREALLOC_FLOATS: usize = 1 << 22;

/// Exact brute-force index: one contiguous buffer, `dimension` floats per
/// vector. Every search scans the whole buffer, which is the right trade
/// for collections small enough to re-embed in one sitting.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "vector dimension must be at least 1");
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn read_from(reader: &mut dyn Read) -> Result<Self> {
        let mut magic = [0u8; 4];
        read_or_truncated(reader, &mut magic, "magic bytes")?;
        if &magic != INDEX_MAGIC {
            return Err(Error::corruption("index artifact has unknown magic bytes"));
        }

        let mut version_buf = [0u8; 2];
        read_or_truncated(reader, &mut version_buf, "format version")?;
        let version = u16::from_le_bytes(version_buf);
        if version != INDEX_VERSION {
            return Err(Error::corruption(format!(
                "index artifact version {} is not supported (expected {})",
                version, INDEX_VERSION
            )));
        }

        let mut u32_buf = [0u8; 4];
        read_or_truncated(reader, &mut u32_buf, "dimension")?;
        let dimension = u32::from_le_bytes(u32_buf) as usize;
        if dimension == 0 {
            return Err(Error::corruption("index artifact declares zero dimension"));
        }

        read_or_truncated(reader, &mut u32_buf, "vector count")?;
        let count = u32::from_le_bytes(u32_buf) as usize;

        let expected = count.saturating_mul(dimension);
        let mut data = Vec::with_capacity(expected.min(MAX_PREALLOC_FLOATS));
        let mut f32_buf = [0u8; 4];
        for _ in 0..expected {
            read_or_truncated(reader, &mut f32_buf, "vector data")?;
            data.push(f32::from_le_bytes(f32_buf));
        }

        let mut probe = [0u8; 1];
        match reader.read(&mut probe) {
            Ok(0) => {}
            Ok(_) => {
                return Err(Error::corruption(
                    "index artifact has trailing bytes after vector data",
                ))
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self { dimension, data })
    }
}

impl VectorIndex for FlatIndex {
    fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        for (offset, vector) in vectors.iter().enumerate() {
            if vector.len() != self.dimension {
                return Err(Error::invalid_argument(format!(
                    "vector {} in batch has dimension {}, index expects {}",
                    offset,
                    vector.len(),
                    self.dimension
                )));
            }
        }

        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(Error::invalid_argument(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dimension
            )));
        }

        let mut worst_first = BinaryHeap::with_capacity(k.min(self.len()) + 1);

        for (position, stored) in self.data.chunks_exact(self.dimension).enumerate() {
            let candidate = Candidate {
                dist: OrderedFloat(squared_euclidean(query, stored)),
                position,
            };
            if worst_first.len() < k {
                worst_first.push(candidate);
            } else if let Some(worst) = worst_first.peek() {
                if candidate < *worst {
                    worst_first.pop();
                    worst_first.push(candidate);
                }
            }
        }

        Ok(worst_first
            .into_sorted_vec()
            .into_iter()
            .map(|c| (c.position, c.dist.into_inner()))
            .collect())
    }

    fn len(&self) -> usize {
        self.data.len() / self.dimension
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(INDEX_MAGIC)?;
        writer.write_all(&INDEX_VERSION.to_le_bytes())?;
        writer.write_all(&(self.dimension as u32).to_le_bytes())?;
        writer.write_all(&(self.len() as u32).to_le_bytes())?;
        for val in &self.data {
            writer.write_all(&val.to_le_bytes())?;
        }
        Ok(())
    }
}

fn read_or_truncated(reader: &mut dyn Read, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::corruption(format!("index artifact truncated while reading {}", what))
        } else {
            Error::from(e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(dimension: usize, vectors: &[Vec<f32>]) -> FlatIndex {
        let mut index = FlatIndex::new(dimension);
        index.add(vectors).unwrap();
        index
    }

    #[test]
    fn positions_follow_insertion_order() {
        let index = filled(2, &[vec![0.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]]);
        assert_eq!(index.len(), 3);

        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(
            hits,
            vec![(0, 0.0), (1, 1.0), (2, 4.0)],
            "closest first, squared distances"
        );
    }

    #[test]
    fn bad_batch_changes_nothing() {
        let mut index = FlatIndex::new(2);
        index.add(&[vec![1.0, 1.0]]).unwrap();

        let err = index
            .add(&[vec![2.0, 2.0], vec![3.0], vec![4.0, 4.0]])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert_eq!(index.len(), 1, "rejected batch must not land partially");

        // the next good batch starts where the first one ended
        index.add(&[vec![5.0, 5.0]]).unwrap();
        let hits = index.search(&[5.0, 5.0], 1).unwrap();
        assert_eq!(hits[0].0, 1);
    }

    #[test]
    fn equal_distances_rank_earlier_position_first() {
        let index = filled(
            2,
            &[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0], vec![9.0, 0.0]],
        );

        let hits = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(hits, vec![(0, 1.0), (1, 1.0)]);

        // same query again: identical ranking
        assert_eq!(index.search(&[0.0, 0.0], 2).unwrap(), hits);
    }

    #[test]
    fn k_beyond_len_returns_everything() {
        let index = filled(2, &[vec![0.5, 0.5], vec![0.0, 1.0]]);
        let hits = index.search(&[0.0, 0.0], 100).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn k_zero_returns_nothing() {
        let index = filled(2, &[vec![0.5, 0.5]]);
        assert!(index.search(&[0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = FlatIndex::new(4);
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }

    #[test]
    fn query_width_is_checked() {
        let index = filled(3, &[vec![0.0, 0.0, 0.0]]);
        let err = index.search(&[0.0, 0.0], 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn duplicate_vectors_keep_distinct_positions() {
        let index = filled(2, &[vec![3.0, 3.0], vec![3.0, 3.0]]);
        let hits = index.search(&[3.0, 3.0], 2).unwrap();
        assert_eq!(hits, vec![(0, 0.0), (1, 0.0)]);
    }

    #[test]
    fn artifact_round_trip_preserves_search_results() {
        let index = filled(
            3,
            &[
                vec![0.1, 0.2, 0.3],
                vec![-1.0, 0.0, 1.0],
                vec![0.0, 0.0, 0.0],
            ],
        );

        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        let restored = FlatIndex::read_from(&mut bytes.as_slice()).unwrap();

        assert_eq!(restored.len(), index.len());
        assert_eq!(restored.dimension(), index.dimension());
        assert_eq!(
            restored.search(&[0.05, 0.1, 0.2], 3).unwrap(),
            index.search(&[0.05, 0.1, 0.2], 3).unwrap()
        );
    }

    #[test]
    fn truncated_artifact_is_corruption() {
        let index = filled(2, &[vec![1.0, 2.0], vec![3.0, 4.0]]);
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        bytes.truncate(bytes.len() - 3);

        let err = FlatIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn foreign_bytes_are_corruption() {
        let bytes = b"definitely not an index";
        let err = FlatIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn unsupported_version_is_corruption() {
        let index = filled(2, &[vec![1.0, 2.0]]);
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;

        let err = FlatIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let index = filled(2, &[vec![1.0, 2.0]]);
        let mut bytes = Vec::new();
        index.write_to(&mut bytes).unwrap();
        bytes.push(0x00);

        let err = FlatIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }

    #[test]
    fn forged_count_is_corruption() {
        // header claims u32::MAX vectors, payload holds two floats
        let mut bytes = Vec::new();
        bytes.extend_from_slice(INDEX_MAGIC);
        bytes.extend_from_slice(&INDEX_VERSION.to_le_bytes());
        bytes.extend_from_slice(&8u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);

        let err = FlatIndex::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::Corruption { .. }));
    }
}
