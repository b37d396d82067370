// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Read planner
//!
//! Groups a PLC's declared tag list into read groups so that contiguous
//! same-type runs are fetched in one FINS round-trip. The plan is computed
//! once at loop start; emission order equals declared order because the CSV
//! column layout depends on it.

use crate::config::{DataType, MemoryArea, TagMapping};

/// One planned read: either a batch covering at least two contiguous
/// mappings, or a single address.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadGroup {
    Batch {
        area: MemoryArea,
        start: u16,
        data_type: DataType,
        tags: Vec<TagMapping>,
    },
    Single(TagMapping),
}

impl ReadGroup {
    /// Number of tags served by this group.
    pub fn len(&self) -> usize {
        match self {
            ReadGroup::Batch { tags, .. } => tags.len(),
            ReadGroup::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plan the read groups for one PLC.
///
/// Single greedy pass: the current run is extended while the next mapping is
/// contiguous with the last one (same area, same type, consecutive words);
/// otherwise the run is emitted and a new one starts. A run of length one is
/// emitted as [`ReadGroup::Single`].
pub fn plan_read_groups(mappings: &[TagMapping]) -> Vec<ReadGroup> {
    let mut groups = Vec::new();
    let mut run: Vec<TagMapping> = Vec::new();

    for mapping in mappings {
        match run.last() {
            Some(prev) if mapping.is_contiguous_with(prev) => run.push(mapping.clone()),
            Some(_) => {
                groups.push(emit(std::mem::take(&mut run)));
                run.push(mapping.clone());
            }
            None => run.push(mapping.clone()),
        }
    }
    if !run.is_empty() {
        groups.push(emit(run));
    }
    groups
}

fn emit(run: Vec<TagMapping>) -> ReadGroup {
    if run.len() >= 2 {
        ReadGroup::Batch {
            area: run[0].memory_area,
            start: run[0].address,
            data_type: run[0].data_type,
            tags: run,
        }
    } else {
        ReadGroup::Single(run.into_iter().next().expect("non-empty run"))
    }
}
