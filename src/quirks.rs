//! Quirks database: injected at init as an immutable configuration struct
//! per device; no process-wide mutable state is required.
//!
//! Modeled as a property-lookup style (named attributes resolved to typed
//! values at device-profile load time), generalized here to the three value
//! shapes a quirks database needs: string, `u32`, and an inclusive range.

use std::collections::HashMap;

/// A looked-up quirk value.
#[derive(Debug, Clone, PartialEq)]
pub enum QuirkValue {
    Str(String),
    U32(u32),
    Range(i32, i32),
}

/// Read-only quirks lookup, fetched once per device at init
/// (`quirks_fetch_for_device`) and never mutated afterward.
pub trait Quirks {
    fn get_string(&self, attr: &str) -> Option<&str>;
    fn get_u32(&self, attr: &str) -> Option<u32>;
    fn get_range(&self, attr: &str) -> Option<(i32, i32)>;
}

/// An in-memory quirks table, typically populated once from a matched quirk
/// file at device init.
#[derive(Debug, Clone, Default)]
pub struct StaticQuirks {
    values: HashMap<String, QuirkValue>,
}

impl StaticQuirks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attr: impl Into<String>, value: QuirkValue) -> Self {
        self.values.insert(attr.into(), value);
        self
    }
}

impl Quirks for StaticQuirks {
    fn get_string(&self, attr: &str) -> Option<&str> {
        match self.values.get(attr) {
            Some(QuirkValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    fn get_u32(&self, attr: &str) -> Option<u32> {
        match self.values.get(attr) {
            Some(QuirkValue::U32(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_range(&self, attr: &str) -> Option<(i32, i32)> {
        match self.values.get(attr) {
            Some(QuirkValue::Range(lo, hi)) => Some((*lo, *hi)),
            _ => None,
        }
    }
}
