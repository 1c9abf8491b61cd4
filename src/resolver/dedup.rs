//! Collapsing of repeated requirements.
//!
//! Each identity key keeps the position where it was first seen and the value
//! it was last seen with, so later lines override earlier ones without
//! reordering the install list.

use crate::requirement::{Requirement, RequirementKey};
use std::collections::{HashMap, HashSet};

/// Deduplicates `items` by [`Requirement::key`].
///
/// Requirements whose name is in `overlay_names` are keyed by name and version
/// instead, so every distinct overlay location survives.
///
/// ```
/// use robustus::requirement::parse;
/// use robustus::resolver::dedup;
///
/// let items: Vec<_> = ["numpy==1.7.2", "pytest==2", "pytest==3", "numpy==1.7.3"]
///     .into_iter()
///     .map(|s| parse(s).unwrap())
///     .collect();
/// let frozen: Vec<String> = dedup(items, &[]).iter().map(|r| r.freeze()).collect();
/// assert_eq!(frozen, ["numpy==1.7.3", "pytest==3"]);
/// ```
pub fn dedup(items: Vec<Requirement>, overlay_names: &[String]) -> Vec<Requirement> {
    let overlays: HashSet<&str> = overlay_names.iter().map(String::as_str).collect();

    let mut slots: Vec<Requirement> = Vec::with_capacity(items.len());
    let mut positions: HashMap<RequirementKey, usize> = HashMap::new();

    for item in items {
        let key = dedup_key(&item, &overlays);
        match positions.get(&key) {
            Some(&slot) => slots[slot] = item,
            None => {
                positions.insert(key, slots.len());
                slots.push(item);
            }
        }
    }

    slots
}

fn dedup_key(item: &Requirement, overlays: &HashSet<&str>) -> RequirementKey {
    match (item.source(), item.name()) {
        (None, Some(name)) if overlays.contains(name) => RequirementKey::Overlay(
            name.to_string(),
            item.version().unwrap_or_default().to_string(),
        ),
        _ => item.key(),
    }
}
