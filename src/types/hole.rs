//! Value model of unfetched history ranges and the pure parts of the fill algorithm.
//!
//! A hole covers a closed interval of the id space of one (peer, namespace). Its tag
//! mask lists the tag partitions that are still unknown inside the interval; the main
//! history partition is unknown wherever any hole exists. Holes of one (peer,
//! namespace) never overlap each other and never contain a stored message id.

use super::ids::{MessageIndex, MessageNamespace, MessageTags, PeerId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHistoryHole {
    pub stable_id: u32,
    pub max_index: MessageIndex,
    pub min_id: i32,
    pub tags: MessageTags,
}

impl MessageHistoryHole {
    pub fn peer_id(&self) -> PeerId {
        self.max_index.id.peer_id
    }

    pub fn namespace(&self) -> MessageNamespace {
        self.max_index.id.namespace
    }

    pub fn max_id(&self) -> i32 {
        self.max_index.id.id
    }

    pub fn range(&self) -> IdRange {
        IdRange::new(self.min_id, self.max_id())
    }

    pub fn contains(&self, id: i32) -> bool {
        self.range().contains(id)
    }
}

/// Closed interval of message ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdRange {
    pub min: i32,
    pub max: i32,
}

impl IdRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn contains(&self, id: i32) -> bool {
        self.min <= id && id <= self.max
    }

    pub fn intersection(&self, other: &IdRange) -> Option<IdRange> {
        let range = IdRange::new(self.min.max(other.min), self.max.min(other.max));
        (!range.is_empty()).then_some(range)
    }

    pub fn span(&self, other: &IdRange) -> IdRange {
        IdRange::new(self.min.min(other.min), self.max.max(other.max))
    }

    /// Splits the interval around the given ids, dropping them.
    pub fn punch(&self, ids: &[i32]) -> Vec<IdRange> {
        let mut sorted: Vec<i32> = ids.iter().copied().filter(|id| self.contains(*id)).collect();
        sorted.sort_unstable();
        sorted.dedup();
        let mut pieces = Vec::new();
        let mut lower = self.min;
        for id in sorted {
            if id > lower {
                pieces.push(IdRange::new(lower, id - 1));
            }
            lower = id.saturating_add(1);
            if id == i32::MAX {
                return pieces;
            }
        }
        if lower <= self.max {
            pieces.push(IdRange::new(lower, self.max));
        }
        pieces
    }
}

/// Direction a fetch advanced through a hole.
///
/// Bounds are message ids; `None` means the fetch reached the hole's edge on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoleFillDirection {
    /// Fetched from `upper_bound` downwards until the lower edge of the hole.
    UpperToLower { upper_bound: Option<i32> },
    /// Fetched from `lower_bound` upwards until the upper edge of the hole.
    LowerToUpper { lower_bound: Option<i32> },
    /// Fetched a window inside the hole.
    Around {
        lower_bound: Option<i32>,
        upper_bound: Option<i32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HoleFill {
    /// The batch is authoritative for the whole hole.
    pub complete: bool,
    pub direction: HoleFillDirection,
}

impl HoleFill {
    pub fn new(complete: bool, direction: HoleFillDirection) -> Self {
        Self {
            complete,
            direction,
        }
    }

    /// Part of `hole` the fetched batch is authoritative for, if any.
    pub fn coverage(&self, hole: IdRange) -> Option<IdRange> {
        if self.complete {
            return Some(hole);
        }
        let requested = match self.direction {
            HoleFillDirection::UpperToLower { upper_bound } => {
                IdRange::new(hole.min, upper_bound.unwrap_or(hole.max))
            }
            HoleFillDirection::LowerToUpper { lower_bound } => {
                IdRange::new(lower_bound.unwrap_or(hole.min), hole.max)
            }
            HoleFillDirection::Around {
                lower_bound,
                upper_bound,
            } => IdRange::new(
                lower_bound.unwrap_or(hole.min),
                upper_bound.unwrap_or(hole.max),
            ),
        };
        hole.intersection(&requested)
    }
}

/// One surviving hole interval after a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolePiece {
    pub range: IdRange,
    pub tags: MessageTags,
}

/// Splits `hole` after `covered` was fetched for the partitions in `filled_tags`.
///
/// Uncovered sides keep the hole's tags. Inside the covered interval the hole
/// survives only for the tags that were not filled, split around `known_ids`.
pub fn split_filled_hole(
    hole: IdRange,
    tags: MessageTags,
    covered: IdRange,
    filled_tags: MessageTags,
    known_ids: &[i32],
) -> Vec<HolePiece> {
    let Some(covered) = hole.intersection(&covered) else {
        return vec![HolePiece { range: hole, tags }];
    };
    let mut pieces = Vec::new();
    if covered.min > hole.min {
        pieces.push(HolePiece {
            range: IdRange::new(hole.min, covered.min - 1),
            tags,
        });
    }
    let residual = tags & !filled_tags;
    if !residual.is_empty() {
        pieces.extend(
            covered
                .punch(known_ids)
                .into_iter()
                .map(|range| HolePiece {
                    range,
                    tags: residual,
                }),
        );
    }
    if covered.max < hole.max {
        pieces.push(HolePiece {
            range: IdRange::new(covered.max + 1, hole.max),
            tags,
        });
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: MessageTags = MessageTags::ALL;

    #[test]
    fn upper_to_lower_fill_keeps_upper_residual() {
        let fill = HoleFill::new(
            false,
            HoleFillDirection::UpperToLower {
                upper_bound: Some(25),
            },
        );
        let hole = IdRange::new(1, 100);
        let covered = fill.coverage(hole).expect("coverage");
        assert_eq!(covered, IdRange::new(1, 25));
        let pieces = split_filled_hole(hole, ALL, covered, ALL, &[10, 20]);
        assert_eq!(
            pieces,
            vec![HolePiece {
                range: IdRange::new(26, 100),
                tags: ALL
            }]
        );
    }

    #[test]
    fn lower_to_upper_fill_keeps_lower_residual() {
        let fill = HoleFill::new(
            false,
            HoleFillDirection::LowerToUpper {
                lower_bound: Some(60),
            },
        );
        let hole = IdRange::new(1, 100);
        let covered = fill.coverage(hole).expect("coverage");
        let pieces = split_filled_hole(hole, ALL, covered, ALL, &[]);
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].range, IdRange::new(1, 59));
    }

    #[test]
    fn bound_past_hole_edge_removes_hole() {
        let fill = HoleFill::new(
            false,
            HoleFillDirection::UpperToLower {
                upper_bound: Some(500),
            },
        );
        let hole = IdRange::new(1, 100);
        let covered = fill.coverage(hole).expect("coverage");
        assert!(split_filled_hole(hole, ALL, covered, ALL, &[]).is_empty());
    }

    #[test]
    fn around_fill_splits_hole() {
        let fill = HoleFill::new(
            false,
            HoleFillDirection::Around {
                lower_bound: Some(40),
                upper_bound: Some(60),
            },
        );
        let hole = IdRange::new(1, 100);
        let covered = fill.coverage(hole).expect("coverage");
        let ranges: Vec<_> = split_filled_hole(hole, ALL, covered, ALL, &[50])
            .into_iter()
            .map(|p| p.range)
            .collect();
        assert_eq!(ranges, vec![IdRange::new(1, 39), IdRange::new(61, 100)]);
    }

    #[test]
    fn tagged_fill_leaves_residual_for_other_tags() {
        let photos = MessageTags::bit(0);
        let hole = IdRange::new(1, 10);
        let pieces = split_filled_hole(hole, ALL, hole, photos, &[4]);
        assert_eq!(
            pieces,
            vec![
                HolePiece {
                    range: IdRange::new(1, 3),
                    tags: ALL & !photos
                },
                HolePiece {
                    range: IdRange::new(5, 10),
                    tags: ALL & !photos
                },
            ]
        );
    }

    #[test]
    fn refill_outside_remaining_hole_is_empty_coverage() {
        let fill = HoleFill::new(
            false,
            HoleFillDirection::UpperToLower {
                upper_bound: Some(25),
            },
        );
        assert_eq!(fill.coverage(IdRange::new(26, 100)), None);
    }

    #[test]
    fn punch_handles_edges() {
        let range = IdRange::new(1, 5);
        assert_eq!(range.punch(&[1, 5]), vec![IdRange::new(2, 4)]);
        assert_eq!(range.punch(&[3, 3, 9]), vec![IdRange::new(1, 2), IdRange::new(4, 5)]);
        assert!(IdRange::new(7, 7).punch(&[7]).is_empty());
        assert_eq!(
            IdRange::new(i32::MAX - 1, i32::MAX).punch(&[i32::MAX]),
            vec![IdRange::new(i32::MAX - 1, i32::MAX - 1)]
        );
    }

    /// Every id of the original range stays either inside a hole or inside a
    /// range some fill was authoritative for, across arbitrary fill sequences.
    #[test]
    fn fills_never_lose_or_duplicate_ranges() {
        let original = IdRange::new(1, 200);
        let fills = [
            HoleFill::new(false, HoleFillDirection::UpperToLower { upper_bound: Some(30) }),
            HoleFill::new(false, HoleFillDirection::LowerToUpper { lower_bound: Some(170) }),
            HoleFill::new(
                false,
                HoleFillDirection::Around {
                    lower_bound: Some(90),
                    upper_bound: Some(110),
                },
            ),
            HoleFill::new(false, HoleFillDirection::UpperToLower { upper_bound: Some(30) }),
            HoleFill::new(false, HoleFillDirection::UpperToLower { upper_bound: Some(60) }),
        ];
        let mut holes = vec![original];
        let mut known: Vec<IdRange> = Vec::new();
        for fill in fills {
            let mut next = Vec::new();
            for hole in &holes {
                match fill.coverage(*hole) {
                    Some(covered) => {
                        known.push(covered);
                        next.extend(
                            split_filled_hole(*hole, ALL, covered, ALL, &[])
                                .into_iter()
                                .map(|p| p.range),
                        );
                    }
                    None => next.push(*hole),
                }
            }
            holes = next;
        }
        for id in original.min..=original.max {
            let in_holes = holes.iter().filter(|r| r.contains(id)).count();
            let in_known = known.iter().any(|r| r.contains(id));
            assert!(in_holes <= 1, "id {id} covered by overlapping holes");
            assert!(in_holes == 1 || in_known, "id {id} lost");
            assert!(!(in_holes == 1 && in_known), "id {id} double counted");
        }
    }
}
