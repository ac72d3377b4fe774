//! List of courses that are running but have no known vehicle position.
//!
//! Unlike the marker layer this list is diffed by key: an entry whose text
//! did not change is never touched, so the "just updated" flash only ever
//! marks real changes.

use crate::models::{MissingEntryRecord, RouteKey};
use crate::render::{EntryHandle, EntryOp};
use ahash::AHashMap;
use itertools::Itertools;
use std::cmp::Ordering;

pub const EMPTY_PLACEHOLDER: &str = "No vehicles without location";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FlashToken(u64);

#[derive(Debug)]
struct RenderedListEntry {
    handle: EntryHandle,
    text: String,
    flash: Option<FlashToken>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ListPatch {
    pub ops: Vec<EntryOp>,
    /// Flashes that need an expiry timer. Any earlier timer for the same key is superseded.
    pub armed: Vec<(RouteKey, FlashToken)>,
    /// Keys whose entry is gone; their pending timers can be dropped.
    pub disarmed: Vec<RouteKey>,
}

pub fn entry_text(record: &MissingEntryRecord) -> String {
    let mut text = format!("Line {} / Course {}", record.line, record.course);
    if let Some(vehicle) = &record.vehicle_label {
        text.push_str(&format!(" (vehicle {})", vehicle));
    }
    if let Some(headsign) = &record.headsign {
        text.push_str(&format!(" to {}", headsign));
    }
    if !record.next_stop.is_empty() {
        text.push_str(&format!(", next stop: {}", record.next_stop));
    }
    text
}

fn numeric_then_text(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Ascending by line, then by course, both compared as numbers where possible.
pub fn entry_order(a: &RouteKey, b: &RouteKey) -> Ordering {
    numeric_then_text(&a.line, &b.line).then_with(|| numeric_then_text(&a.course, &b.course))
}

#[derive(Debug, Default)]
pub struct MissingListReconciler {
    entries: AHashMap<RouteKey, RenderedListEntry>,
    order: Vec<EntryHandle>,
    placeholder_shown: bool,
    next_handle: u64,
    next_token: u64,
}

impl MissingListReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handle(&self, key: &RouteKey) -> Option<EntryHandle> {
        self.entries.get(key).map(|entry| entry.handle)
    }

    pub fn is_flashing(&self, key: &RouteKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.flash.is_some())
    }

    pub fn reconcile(&mut self, snapshot: &[MissingEntryRecord]) -> ListPatch {
        let mut patch = ListPatch::default();

        let mut latest: AHashMap<RouteKey, &MissingEntryRecord> =
            AHashMap::with_capacity(snapshot.len());
        for record in snapshot {
            let key = record.key();
            if latest.insert(key.clone(), record).is_some() {
                tracing::warn!(key = %key, "duplicate missing course in snapshot");
            }
        }

        // what the surface will show once removals and appended creations land
        let mut surface_order = self.order.clone();

        let gone: Vec<RouteKey> = self
            .entries
            .keys()
            .filter(|key| !latest.contains_key(*key))
            .cloned()
            .collect();
        for key in gone {
            if let Some(entry) = self.entries.remove(&key) {
                patch.ops.push(EntryOp::Remove {
                    handle: entry.handle,
                });
                surface_order.retain(|handle| *handle != entry.handle);
                if entry.flash.is_some() {
                    patch.disarmed.push(key);
                }
            }
        }

        if latest.is_empty() {
            if !self.placeholder_shown {
                patch
                    .ops
                    .push(EntryOp::ShowPlaceholder(EMPTY_PLACEHOLDER.to_string()));
                self.placeholder_shown = true;
            }
            self.order.clear();
            return patch;
        }

        if self.placeholder_shown {
            patch.ops.push(EntryOp::HidePlaceholder);
            self.placeholder_shown = false;
        }

        let sorted: Vec<RouteKey> = latest.keys().cloned().sorted_by(entry_order).collect();

        for key in &sorted {
            let Some(record) = latest.get(key) else {
                continue;
            };
            let text = entry_text(record);

            match self.entries.get_mut(key) {
                Some(entry) if entry.text == text => {}
                Some(entry) => {
                    self.next_token += 1;
                    let token = FlashToken(self.next_token);

                    patch.ops.push(EntryOp::SetText {
                        handle: entry.handle,
                        text: text.clone(),
                    });
                    patch.ops.push(EntryOp::Flash {
                        handle: entry.handle,
                        on: true,
                    });
                    entry.text = text;
                    entry.flash = Some(token);
                    patch.armed.push((key.clone(), token));
                }
                None => {
                    self.next_handle += 1;
                    self.next_token += 1;
                    let handle = EntryHandle(self.next_handle);
                    let token = FlashToken(self.next_token);

                    patch.ops.push(EntryOp::Create {
                        handle,
                        key: key.clone(),
                        text: text.clone(),
                    });
                    patch.ops.push(EntryOp::Flash { handle, on: true });
                    surface_order.push(handle);
                    self.entries.insert(
                        key.clone(),
                        RenderedListEntry {
                            handle,
                            text,
                            flash: Some(token),
                        },
                    );
                    patch.armed.push((key.clone(), token));
                }
            }
        }

        let order: Vec<EntryHandle> = sorted
            .iter()
            .filter_map(|key| self.entries.get(key).map(|entry| entry.handle))
            .collect();
        if order != surface_order {
            patch.ops.push(EntryOp::Order(order.clone()));
        }
        self.order = order;

        patch
    }

    /// Clears a flash if `token` is still the latest one armed for `key`.
    pub fn expire_flash(&mut self, key: &RouteKey, token: FlashToken) -> Option<EntryOp> {
        let entry = self.entries.get_mut(key)?;
        if entry.flash != Some(token) {
            return None;
        }
        entry.flash = None;
        Some(EntryOp::Flash {
            handle: entry.handle,
            on: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{MemorySurface, RenderSurface};
    use pretty_assertions::assert_eq;

    fn missing(line: &str, course: &str, next_stop: &str) -> MissingEntryRecord {
        MissingEntryRecord {
            line: line.to_string(),
            course: course.to_string(),
            vehicle_label: None,
            next_stop: next_stop.to_string(),
            headsign: None,
        }
    }

    fn apply(
        reconciler: &mut MissingListReconciler,
        surface: &mut MemorySurface,
        snapshot: &[MissingEntryRecord],
    ) -> ListPatch {
        let patch = reconciler.reconcile(snapshot);
        surface.apply_entries(&patch.ops);
        patch
    }

    #[test]
    fn changed_text_keeps_handle_and_rearms_flash() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();
        let key = RouteKey::new("5", "2");

        let first = apply(&mut reconciler, &mut surface, &[missing("5", "2", "A")]);
        let handle = reconciler.handle(&key).unwrap();
        assert_eq!(first.armed.len(), 1);

        let second = apply(&mut reconciler, &mut surface, &[missing("5", "2", "B")]);

        assert_eq!(reconciler.handle(&key), Some(handle));
        assert_eq!(surface.entry_count(), 1);
        assert_eq!(
            surface.entry(handle).unwrap().text,
            "Line 5 / Course 2, next stop: B"
        );
        assert!(surface.entry(handle).unwrap().flashing);
        assert_eq!(second.armed.len(), 1);
        assert_ne!(second.armed[0].1, first.armed[0].1);
        assert_eq!(
            second.ops,
            vec![
                EntryOp::SetText {
                    handle,
                    text: "Line 5 / Course 2, next stop: B".to_string(),
                },
                EntryOp::Flash { handle, on: true },
            ]
        );
    }

    #[test]
    fn unchanged_snapshot_produces_no_ops() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();
        let snapshot = vec![missing("101", "3", "Berliner Platz"), missing("105", "1", "Rathaus")];

        apply(&mut reconciler, &mut surface, &snapshot);
        let mutations = surface.entry_mutations();

        let patch = apply(&mut reconciler, &mut surface, &snapshot);

        assert!(patch.ops.is_empty());
        assert!(patch.armed.is_empty());
        assert_eq!(surface.entry_mutations(), mutations);
    }

    #[test]
    fn absent_key_is_removed() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();

        apply(
            &mut reconciler,
            &mut surface,
            &[missing("101", "3", "A"), missing("105", "1", "B")],
        );
        let patch = apply(&mut reconciler, &mut surface, &[missing("105", "1", "B")]);

        assert_eq!(surface.entry_count(), 1);
        assert_eq!(reconciler.handle(&RouteKey::new("101", "3")), None);
        assert_eq!(patch.disarmed, vec![RouteKey::new("101", "3")]);
    }

    #[test]
    fn empty_snapshot_shows_placeholder_once() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();

        apply(&mut reconciler, &mut surface, &[missing("101", "3", "A")]);
        apply(&mut reconciler, &mut surface, &[]);

        assert_eq!(surface.entry_count(), 0);
        assert_eq!(surface.placeholder(), Some(EMPTY_PLACEHOLDER));

        let patch = apply(&mut reconciler, &mut surface, &[]);
        assert!(patch.ops.is_empty());

        apply(&mut reconciler, &mut surface, &[missing("101", "3", "A")]);
        assert_eq!(surface.placeholder(), None);
        assert_eq!(surface.entry_count(), 1);
    }

    #[test]
    fn entries_sorted_numerically_by_line_then_course() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();

        apply(
            &mut reconciler,
            &mut surface,
            &[
                missing("109", "2", ""),
                missing("101", "10", ""),
                missing("NE1", "1", ""),
                missing("101", "9", ""),
                missing("98", "1", ""),
            ],
        );

        assert_eq!(
            surface.entry_texts(),
            vec![
                "Line 98 / Course 1",
                "Line 101 / Course 9",
                "Line 101 / Course 10",
                "Line 109 / Course 2",
                "Line NE1 / Course 1",
            ]
        );
    }

    #[test]
    fn new_entry_in_the_middle_reorders() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();

        apply(
            &mut reconciler,
            &mut surface,
            &[missing("101", "1", ""), missing("108", "1", "")],
        );
        let patch = apply(
            &mut reconciler,
            &mut surface,
            &[missing("101", "1", ""), missing("105", "1", ""), missing("108", "1", "")],
        );

        assert!(matches!(patch.ops.last(), Some(EntryOp::Order(order)) if order.len() == 3));
        assert_eq!(
            surface.entry_texts(),
            vec!["Line 101 / Course 1", "Line 105 / Course 1", "Line 108 / Course 1"]
        );
    }

    #[test]
    fn appended_entry_needs_no_reorder() {
        let mut reconciler = MissingListReconciler::new();
        let mut surface = MemorySurface::new();

        apply(&mut reconciler, &mut surface, &[missing("101", "1", "")]);
        let patch = apply(
            &mut reconciler,
            &mut surface,
            &[missing("101", "1", ""), missing("108", "1", "")],
        );

        assert!(!patch.ops.iter().any(|op| matches!(op, EntryOp::Order(_))));
    }

    #[test]
    fn superseded_flash_token_is_ignored() {
        let mut reconciler = MissingListReconciler::new();
        let key = RouteKey::new("5", "2");

        let first = reconciler.reconcile(&[missing("5", "2", "A")]);
        let second = reconciler.reconcile(&[missing("5", "2", "B")]);

        assert_eq!(reconciler.expire_flash(&key, first.armed[0].1), None);
        assert!(reconciler.is_flashing(&key));

        let handle = reconciler.handle(&key).unwrap();
        assert_eq!(
            reconciler.expire_flash(&key, second.armed[0].1),
            Some(EntryOp::Flash { handle, on: false })
        );
        assert!(!reconciler.is_flashing(&key));
    }

    #[test]
    fn entry_text_includes_optional_details() {
        let record = MissingEntryRecord {
            line: "107".to_string(),
            course: "4".to_string(),
            vehicle_label: Some("1234".to_string()),
            next_stop: "Gelsenkirchen Hbf".to_string(),
            headsign: Some("Bredeney".to_string()),
        };

        assert_eq!(
            entry_text(&record),
            "Line 107 / Course 4 (vehicle 1234) to Bredeney, next stop: Gelsenkirchen Hbf"
        );
    }
}
