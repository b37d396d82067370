// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the fins-opcua-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-cycle sample buffer
//!
//! Holds the decoded value of every tag for the current acquisition cycle.
//! Iteration order is the declared tag order — the CSV column layout and the
//! OPC UA write order both depend on it, so the buffer carries an explicit
//! slot vector instead of relying on map iteration order.

use std::collections::HashMap;

use super::value::TagValue;

/// Tag-name → value mapping for one cycle, iterating in declared order.
///
/// The slot layout is fixed at loop start; `reset` clears the values between
/// cycles without reallocating.
#[derive(Debug)]
pub struct SampleBuffer {
    names: Vec<String>,
    slots: HashMap<String, usize>,
    values: Vec<Option<TagValue>>,
}

impl SampleBuffer {
    /// Create a buffer for the given column names, in declared order.
    pub fn new(names: Vec<String>) -> Self {
        let slots = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let values = vec![None; names.len()];
        SampleBuffer {
            names,
            slots,
            values,
        }
    }

    /// Clear every value. Called at the start of each cycle; there is no
    /// carry-over between cycles.
    pub fn reset(&mut self) {
        for value in &mut self.values {
            *value = None;
        }
    }

    /// Store the decoded value for `name`. Returns false when the tag is not
    /// part of this buffer's layout.
    pub fn insert(&mut self, name: &str, value: TagValue) -> bool {
        match self.slots.get(name) {
            Some(&slot) => {
                self.values[slot] = Some(value);
                true
            }
            None => false,
        }
    }

    /// Value currently stored for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.slots
            .get(name)
            .and_then(|&slot| self.values[slot].as_ref())
    }

    /// Number of columns in the buffer layout.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate `(name, value)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&TagValue>)> {
        self.names
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.as_str(), value.as_ref()))
    }
}
