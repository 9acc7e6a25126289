//! Snapshot -> `UiUpdate` projection. Every frame is rebuilt from scratch.

use dispatchgrid_protocol::{targets, Patch, UiUpdate};
use dispatchgrid_engine::{
    AnimatedNode, DriverRow, GridMapper, MarkerKind, ModeChange, NotificationEntry, RenderLayer,
    RideForm, RideRow, RiderRow,
};
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};
use serde_json::json;
use std::collections::HashMap;
use std::fmt::Write;

/// Everything one frame is made of, borrowed from the console state.
pub struct FrameParts<'a> {
    pub mapper: &'a GridMapper,
    pub layer: &'a RenderLayer,
    pub animated: &'a [AnimatedNode],
    pub mode: ModeChange,
    /// Attached notifications, oldest first, fading ones included.
    pub notifications: &'a [NotificationEntry],
    pub drivers: &'a [DriverRow],
    pub riders: &'a [RiderRow],
    pub rides: &'a [RideRow],
    pub form: &'a RideForm,
}

pub fn frame(event: &str, parts: FrameParts<'_>) -> UiUpdate {
    let animating = !parts.animated.is_empty();
    let fading = parts.notifications.iter().any(|e| !e.is_shown());
    let patches = vec![
        grid(parts.mapper, parts.layer, parts.animated),
        mode_status(parts.mode),
        notification(parts.notifications),
        Patch::replace(targets::DRIVERS_TABLE, drivers_table(parts.drivers)),
        Patch::replace(targets::RIDERS_TABLE, riders_table(parts.riders)),
        Patch::replace(targets::RIDES_TABLE, rides_table(parts.rides)),
        rider_select(parts.riders, parts.form),
    ];
    let mut update = UiUpdate::new(event, patches);
    update.payload = Some(json!({
        "animating": animating,
        "fading": fading,
        "markers": parts.layer.markers().len(),
    }));
    update
}

pub fn grid(mapper: &GridMapper, layer: &RenderLayer, animated: &[AnimatedNode]) -> Patch {
    let moving: HashMap<usize, (f64, f64)> =
        animated.iter().map(|n| (n.node.0, (n.x, n.y))).collect();
    let size = mapper.scale();
    let mut html = String::new();
    for (idx, marker) in layer.markers().iter().enumerate() {
        let (left, top) = moving
            .get(&idx)
            .copied()
            .unwrap_or((marker.pixel.x as f64, marker.pixel.y as f64));
        let _ = write!(
            html,
            "<div id=\"node-{idx}\" class=\"{}\" style=\"left:{left}px;top:{top}px;width:{size}px;height:{size}px\"",
            marker.kind.css_class()
        );
        if let Some(title) = &marker.title {
            let _ = write!(html, " title=\"{}\"", attr(title));
        }
        html.push_str("></div>");
    }
    let extent = mapper.extent_px();
    Patch::replace(targets::GRID, html).with_payload(json!({
        "extent": extent,
        "scale": size,
        "grid_size": mapper.grid_size(),
        "paths": layer.markers().iter().filter(|m| m.kind == MarkerKind::Path).count(),
    }))
}

pub fn mode_status(change: ModeChange) -> Patch {
    Patch::replace(targets::MODE_STATUS, text(change.label).to_string())
        .with_payload(json!(change))
}

/// One element per attached entry, tagged with its phase so the page can fade
/// retiring and expiring ones out.
pub fn notification(entries: &[NotificationEntry]) -> Patch {
    if entries.is_empty() {
        return Patch::remove(targets::NOTIFICATION);
    }
    let mut html = String::new();
    for entry in entries {
        let _ = write!(
            html,
            "<div class=\"notification {} {}\" data-id=\"{}\"><span class=\"icon\">{}</span><span class=\"message\">{}</span></div>",
            entry.severity.as_str(),
            entry.phase_class(),
            entry.id,
            entry.severity.icon(),
            text(&entry.message)
        );
    }
    Patch::replace(targets::NOTIFICATION, html)
}

fn status_badge(status: &str) -> String {
    format!(
        "<span class=\"status {0}\">{1}</span>",
        attr(status),
        text(&status.replace('_', " "))
    )
}

fn action(kind: &str, id: &str, label: &str) -> String {
    format!(
        "<button class=\"btn small\" data-action=\"{}\" data-id=\"{}\">{}</button>",
        kind,
        attr(id),
        label
    )
}

pub fn drivers_table(rows: &[DriverRow]) -> String {
    if rows.is_empty() {
        return "<p class=\"empty\">No drivers</p>".to_string();
    }
    let mut html = String::from(
        "<table><thead><tr><th>ID</th><th>Location</th><th>Status</th><th>Rides</th><th></th></tr></thead><tbody>",
    );
    for row in rows {
        let remove = if row.removable {
            action("remove-driver", &row.id, "Remove")
        } else {
            String::new()
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(&row.id),
            row.location,
            status_badge(row.status.as_str()),
            row.assigned_rides,
            remove
        );
    }
    html.push_str("</tbody></table>");
    html
}

pub fn riders_table(rows: &[RiderRow]) -> String {
    if rows.is_empty() {
        return "<p class=\"empty\">No riders</p>".to_string();
    }
    let mut html = String::from(
        "<table><thead><tr><th>ID</th><th>Location</th><th></th></tr></thead><tbody>",
    );
    for row in rows {
        let cell = if row.removable() {
            action("remove-rider", &row.id, "Remove")
        } else {
            "<span class=\"muted\">Has Active Request</span>".to_string()
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(&row.id),
            row.location,
            cell
        );
    }
    html.push_str("</tbody></table>");
    html
}

pub fn rides_table(rows: &[RideRow]) -> String {
    if rows.is_empty() {
        return "<p class=\"empty\">No ride requests</p>".to_string();
    }
    let mut html = String::from(
        "<table><thead><tr><th>ID</th><th>Rider</th><th>Pickup</th><th>Dropoff</th><th>Status</th><th>Driver</th><th></th></tr></thead><tbody>",
    );
    for row in rows {
        let cancel = if row.cancellable {
            action("cancel-ride", &row.id, "Cancel")
        } else {
            String::new()
        };
        let _ = write!(
            html,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            text(&row.id),
            text(&row.rider_id),
            row.pickup,
            row.dropoff,
            status_badge(row.status.as_str()),
            text(row.driver.as_deref().unwrap_or("None")),
            cancel
        );
    }
    html.push_str("</tbody></table>");
    html
}

/// Rider `<option>` list plus the selection and pickup the form holds.
pub fn rider_select(riders: &[RiderRow], form: &RideForm) -> Patch {
    let selected = form.rider_id();
    let mut html = String::from("<option value=\"\">Select a rider</option>");
    for rider in riders {
        let mark = if Some(rider.id.as_str()) == selected {
            " selected"
        } else {
            ""
        };
        let _ = write!(
            html,
            "<option value=\"{}\"{mark}>{} {}</option>",
            attr(&rider.id),
            text(&rider.id),
            rider.location
        );
    }
    Patch::replace(targets::RIDER_SELECT, html).with_payload(json!({
        "rider_id": selected,
        "pickup": form.pickup(),
        "dropoff": form.dropoff(),
    }))
}
