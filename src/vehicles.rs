use crate::models::{RouteKey, VehicleSnapshotRecord};
use crate::render::{MarkerHandle, MarkerOp, MarkerSpec};
use ahash::AHashMap;

pub const LINE_PALETTE: [&str; 12] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990",
    "#9a6324", "#800000", "#808000", "#000075",
];

/// Same line, same colour: UTF-16 code units summed, modulo the palette.
pub fn line_color(line: &str) -> &'static str {
    let sum: u64 = line.encode_utf16().map(u64::from).sum();
    LINE_PALETTE[(sum % LINE_PALETTE.len() as u64) as usize]
}

fn normalize_identifier(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        trimmed.to_string()
    }
}

pub fn display_label(line: &str, course: &str) -> String {
    format!("{}/{}", normalize_identifier(line), normalize_identifier(course))
}

pub fn normalize_heading(heading: f64) -> f64 {
    if !heading.is_finite() {
        return 0.0;
    }
    let wrapped = heading.rem_euclid(360.0);
    // rounding can land tiny negatives on 360 itself
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

fn popup_text(record: &VehicleSnapshotRecord) -> String {
    let mut popup = format!("Line: {}\nCourse: {}", record.line, record.course);
    if let Some(vehicle) = &record.vehicle_label {
        popup.push_str(&format!("\nVehicle: {}", vehicle));
    }
    if let Some(headsign) = &record.headsign {
        popup.push_str(&format!("\nTo: {}", headsign));
    }
    popup
}

pub fn marker_spec(record: &VehicleSnapshotRecord) -> MarkerSpec {
    MarkerSpec {
        key: record.key(),
        latitude: record.latitude,
        longitude: record.longitude,
        rotation: normalize_heading(record.heading),
        color: line_color(&record.line),
        label: display_label(&record.line, &record.course),
        popup: popup_text(record),
    }
}

/// Owns the rendered marker set. Every snapshot replaces it completely.
#[derive(Debug, Default)]
pub struct VehicleReconciler {
    markers: AHashMap<RouteKey, MarkerHandle>,
    next_handle: u64,
}

impl VehicleReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn handle(&self, key: &RouteKey) -> Option<MarkerHandle> {
        self.markers.get(key).copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RouteKey> {
        self.markers.keys()
    }

    pub fn reconcile(&mut self, snapshot: &[VehicleSnapshotRecord]) -> Vec<MarkerOp> {
        let mut ops = Vec::with_capacity(self.markers.len() + snapshot.len());

        for (_, handle) in self.markers.drain() {
            ops.push(MarkerOp::Remove { handle });
        }

        // last record for a key wins if the backend ever repeats one
        let mut latest: AHashMap<RouteKey, &VehicleSnapshotRecord> =
            AHashMap::with_capacity(snapshot.len());
        let mut order = Vec::with_capacity(snapshot.len());
        for record in snapshot {
            let key = record.key();
            if latest.insert(key.clone(), record).is_some() {
                tracing::warn!(key = %key, "duplicate vehicle in snapshot");
            } else {
                order.push(key);
            }
        }

        for key in order {
            let Some(record) = latest.get(&key).copied() else {
                continue;
            };
            self.next_handle += 1;
            let handle = MarkerHandle(self.next_handle);
            self.markers.insert(key, handle);
            ops.push(MarkerOp::Create {
                handle,
                spec: marker_spec(record),
            });
        }

        ops
    }
}
