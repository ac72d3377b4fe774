//! Boundary between the reconcilers and whatever draws the map and the list.

use crate::filter::CourseSelector;
use crate::models::RouteKey;
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryHandle(pub u64);

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSpec {
    pub key: RouteKey,
    pub latitude: f64,
    pub longitude: f64,
    /// Icon rotation in degrees, in `[0, 360)`.
    pub rotation: f64,
    pub color: &'static str,
    pub label: String,
    pub popup: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MarkerOp {
    Create { handle: MarkerHandle, spec: MarkerSpec },
    Remove { handle: MarkerHandle },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryOp {
    Create {
        handle: EntryHandle,
        key: RouteKey,
        text: String,
    },
    SetText {
        handle: EntryHandle,
        text: String,
    },
    Flash {
        handle: EntryHandle,
        on: bool,
    },
    Remove {
        handle: EntryHandle,
    },
    /// Full display order, top to bottom.
    Order(Vec<EntryHandle>),
    ShowPlaceholder(String),
    HidePlaceholder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stream {
    Lines,
    Courses,
    Vehicles,
    Missing,
}

/// Each `apply_*` call receives one reconciliation cycle and must show it as a
/// single update.
pub trait RenderSurface {
    fn apply_markers(&mut self, ops: &[MarkerOp]);

    fn apply_entries(&mut self, ops: &[EntryOp]);

    fn set_line_options(&mut self, lines: &[String], selected: Option<&str>);

    fn set_course_selector(&mut self, selector: &CourseSelector, selected: Option<&str>);

    fn set_stale(&mut self, stream: Stream, stale: bool);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryEntry {
    pub key: RouteKey,
    pub text: String,
    pub flashing: bool,
}

/// Keeps the rendered state in memory. Used headless and in tests.
#[derive(Debug)]
pub struct MemorySurface {
    markers: AHashMap<MarkerHandle, MarkerSpec>,
    entries: AHashMap<EntryHandle, MemoryEntry>,
    order: Vec<EntryHandle>,
    placeholder: Option<String>,
    line_options: Vec<String>,
    selected_line: Option<String>,
    course_selector: CourseSelector,
    selected_course: Option<String>,
    stale: AHashSet<Stream>,
    entry_mutations: usize,
    marker_batches: usize,
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self {
            markers: AHashMap::new(),
            entries: AHashMap::new(),
            order: Vec::new(),
            placeholder: None,
            line_options: Vec::new(),
            selected_line: None,
            course_selector: CourseSelector::Hidden,
            selected_course: None,
            stale: AHashSet::new(),
            entry_mutations: 0,
            marker_batches: 0,
        }
    }
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn marker_keys(&self) -> BTreeSet<RouteKey> {
        self.markers.values().map(|spec| spec.key.clone()).collect()
    }

    pub fn marker(&self, key: &RouteKey) -> Option<(MarkerHandle, &MarkerSpec)> {
        self.markers
            .iter()
            .find(|(_, spec)| &spec.key == key)
            .map(|(handle, spec)| (*handle, spec))
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry(&self, handle: EntryHandle) -> Option<&MemoryEntry> {
        self.entries.get(&handle)
    }

    pub fn entry_handle(&self, key: &RouteKey) -> Option<EntryHandle> {
        self.entries
            .iter()
            .find(|(_, entry)| &entry.key == key)
            .map(|(handle, _)| *handle)
    }

    /// Entry texts in display order.
    pub fn entry_texts(&self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|handle| self.entries.get(handle))
            .map(|entry| entry.text.clone())
            .collect()
    }

    pub fn placeholder(&self) -> Option<&str> {
        self.placeholder.as_deref()
    }

    pub fn line_options(&self) -> &[String] {
        &self.line_options
    }

    pub fn selected_line(&self) -> Option<&str> {
        self.selected_line.as_deref()
    }

    pub fn course_selector(&self) -> &CourseSelector {
        &self.course_selector
    }

    pub fn selected_course(&self) -> Option<&str> {
        self.selected_course.as_deref()
    }

    pub fn is_stale(&self, stream: Stream) -> bool {
        self.stale.contains(&stream)
    }

    /// Number of list operations applied so far.
    pub fn entry_mutations(&self) -> usize {
        self.entry_mutations
    }

    pub fn marker_batches(&self) -> usize {
        self.marker_batches
    }
}

impl RenderSurface for MemorySurface {
    fn apply_markers(&mut self, ops: &[MarkerOp]) {
        self.marker_batches += 1;

        for op in ops {
            match op {
                MarkerOp::Create { handle, spec } => {
                    if self.markers.insert(*handle, spec.clone()).is_some() {
                        tracing::warn!(?handle, "marker handle created twice");
                    }
                }
                MarkerOp::Remove { handle } => {
                    if self.markers.remove(handle).is_none() {
                        tracing::warn!(?handle, "removing unknown marker");
                    }
                }
            }
        }

        tracing::debug!(ops = ops.len(), markers = self.markers.len(), "marker batch applied");
    }

    fn apply_entries(&mut self, ops: &[EntryOp]) {
        for op in ops {
            self.entry_mutations += 1;

            match op {
                EntryOp::Create { handle, key, text } => {
                    self.entries.insert(
                        *handle,
                        MemoryEntry {
                            key: key.clone(),
                            text: text.clone(),
                            flashing: false,
                        },
                    );
                    self.order.push(*handle);
                }
                EntryOp::SetText { handle, text } => match self.entries.get_mut(handle) {
                    Some(entry) => entry.text = text.clone(),
                    None => tracing::warn!(?handle, "updating unknown entry"),
                },
                EntryOp::Flash { handle, on } => {
                    if let Some(entry) = self.entries.get_mut(handle) {
                        entry.flashing = *on;
                    }
                }
                EntryOp::Remove { handle } => {
                    self.entries.remove(handle);
                    self.order.retain(|h| h != handle);
                }
                EntryOp::Order(order) => {
                    self.order = order.clone();
                }
                EntryOp::ShowPlaceholder(text) => {
                    self.placeholder = Some(text.clone());
                }
                EntryOp::HidePlaceholder => {
                    self.placeholder = None;
                }
            }
        }

        if !ops.is_empty() {
            tracing::debug!(ops = ops.len(), entries = self.entries.len(), "list batch applied");
        }
    }

    fn set_line_options(&mut self, lines: &[String], selected: Option<&str>) {
        self.line_options = lines.to_vec();
        self.selected_line = selected.map(str::to_string);
    }

    fn set_course_selector(&mut self, selector: &CourseSelector, selected: Option<&str>) {
        self.course_selector = selector.clone();
        self.selected_course = selected.map(str::to_string);
    }

    fn set_stale(&mut self, stream: Stream, stale: bool) {
        if stale {
            self.stale.insert(stream);
        } else {
            self.stale.remove(&stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_ops_keep_display_order() {
        let mut surface = MemorySurface::new();
        let a = EntryHandle(1);
        let b = EntryHandle(2);

        surface.apply_entries(&[
            EntryOp::Create {
                handle: a,
                key: RouteKey::new("101", "1"),
                text: "a".to_string(),
            },
            EntryOp::Create {
                handle: b,
                key: RouteKey::new("101", "2"),
                text: "b".to_string(),
            },
            EntryOp::Order(vec![b, a]),
        ]);
        assert_eq!(surface.entry_texts(), vec!["b", "a"]);

        surface.apply_entries(&[EntryOp::Remove { handle: b }]);
        assert_eq!(surface.entry_texts(), vec!["a"]);
        assert_eq!(surface.entry_mutations(), 4);
    }

    #[test]
    fn stale_flags_are_per_stream() {
        let mut surface = MemorySurface::new();

        surface.set_stale(Stream::Vehicles, true);
        assert!(surface.is_stale(Stream::Vehicles));
        assert!(!surface.is_stale(Stream::Missing));

        surface.set_stale(Stream::Vehicles, false);
        assert!(!surface.is_stale(Stream::Vehicles));
    }
}
