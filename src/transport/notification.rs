//! Notification payloads carried over MQTT.
//!
//! A notification wraps a recorded detection event in pixel coordinates.
//! [`Notification::detection_event`] extracts the camera and normalizes the
//! boxes; any error there means the bridge forwards the payload unfiltered.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detect::{DetectedObject, DetectionEvent};
use crate::geometry::Rect;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notifier_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub options: Value,
}

impl Notification {
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let notification: Self =
            serde_json::from_slice(payload).context("notification is not valid JSON")?;
        if notification.notifier_id.trim().is_empty() {
            return Err(anyhow!("notification has an empty notifier_id"));
        }
        Ok(notification)
    }

    /// Camera id from `recordedEvent.id`, else the second `-` field of
    /// `data.snoozeId` (`notify-<camera>-<label>`).
    pub fn camera_id(&self) -> Option<String> {
        let from_event = self
            .options
            .pointer("/recordedEvent/id")
            .and_then(id_string)
            .filter(|id| !id.is_empty());
        from_event.or_else(|| {
            self.options
                .pointer("/data/snoozeId")
                .and_then(Value::as_str)
                .and_then(|snooze| snooze.split('-').nth(1))
                .filter(|id| !id.is_empty())
                .map(str::to_string)
        })
    }

    pub fn detection_event(&self) -> Result<DetectionEvent> {
        if self.options.is_null() {
            return Err(anyhow!("notification has no options"));
        }
        let recorded = self
            .options
            .get("recordedEvent")
            .ok_or_else(|| anyhow!("notification has no recordedEvent"))?;
        let camera_id = self
            .camera_id()
            .ok_or_else(|| anyhow!("notification names no camera"))?;
        let data = recorded
            .get("data")
            .ok_or_else(|| anyhow!("recordedEvent has no data"))?;
        let detections = data
            .get("detections")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("recordedEvent has no detections"))?;
        let (frame_w, frame_h) = input_dimensions(data)?;

        let timestamp_ms = recorded
            .get("timestamp")
            .or_else(|| data.get("timestamp"))
            .and_then(Value::as_f64)
            .filter(|ts| ts.is_finite() && *ts >= 0.0)
            .map(|ts| ts as u64)
            .unwrap_or(0);

        let mut event = DetectionEvent::new(camera_id, timestamp_ms);
        event.metadata = self.options.get("data").cloned().unwrap_or(Value::Null);
        for (index, detection) in detections.iter().enumerate() {
            let Some(bbox) = detection.get("boundingBox") else {
                continue;
            };
            // Unlabelled boxes still count for zones that accept any class.
            let class_label = detection
                .get("className")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let [x, y, w, h] = pixel_box(bbox)
                .with_context(|| format!("detection {} ({}) has a bad boundingBox", index, class_label))?;
            let rect = Rect::new(x / frame_w, y / frame_h, w / frame_w, h / frame_h);
            let mut object = DetectedObject::new(class_label, rect);
            if let Some(score) = detection.get("score").and_then(Value::as_f64) {
                object = object.with_score(score);
            }
            event.objects.push(object);
        }
        if event.objects.is_empty() {
            return Err(anyhow!("recordedEvent has no detections with a boundingBox"));
        }
        Ok(event)
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn input_dimensions(data: &Value) -> Result<(f64, f64)> {
    let dims = data
        .get("inputDimensions")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("recordedEvent has no inputDimensions"))?;
    let (w, h) = match dims.as_slice() {
        [w, h, ..] => (w.as_f64(), h.as_f64()),
        _ => (None, None),
    };
    match (w, h) {
        (Some(w), Some(h)) if w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0 => Ok((w, h)),
        _ => Err(anyhow!("inputDimensions must be two positive numbers")),
    }
}

fn pixel_box(value: &Value) -> Result<[f64; 4]> {
    let parts = value
        .as_array()
        .ok_or_else(|| anyhow!("boundingBox is not an array"))?;
    if parts.len() != 4 {
        return Err(anyhow!("boundingBox has {} values, expected 4", parts.len()));
    }
    let mut out = [0.0; 4];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| anyhow!("boundingBox values must be finite numbers"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "notifier_id": "phone",
            "title": "Person detected",
            "options": {
                "recordedEvent": {
                    "id": "cam1",
                    "timestamp": 1_700_000_000_000u64,
                    "data": {
                        "inputDimensions": [1000, 500],
                        "detections": [
                            {"className": "person", "score": 0.91, "boundingBox": [100, 200, 50, 100]},
                            {"className": "motion"},
                            {"className": "car", "boundingBox": [0, 0, 1000, 500]}
                        ]
                    }
                },
                "data": {"snoozeId": "notify-cam9-person"}
            }
        })
    }

    fn parse(value: Value) -> Notification {
        Notification::from_slice(value.to_string().as_bytes()).expect("notification")
    }

    #[test]
    fn normalizes_pixel_boxes() {
        let event = parse(sample()).detection_event().expect("event");
        assert_eq!(event.camera_id, "cam1");
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
        assert_eq!(event.objects.len(), 2);
        assert_eq!(event.objects[0].class_label, "person");
        assert_eq!(event.objects[0].bounding_box, Rect::new(0.1, 0.4, 0.05, 0.2));
        assert_eq!(event.objects[0].score, Some(0.91));
        assert_eq!(event.objects[1].bounding_box, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(event.metadata["snoozeId"], "notify-cam9-person");
    }

    #[test]
    fn camera_falls_back_to_snooze_id() {
        let mut value = sample();
        value["options"]["recordedEvent"]["id"] = Value::Null;
        let event = parse(value).detection_event().expect("event");
        assert_eq!(event.camera_id, "cam9");
    }

    #[test]
    fn missing_pieces_are_errors() {
        let mut no_dims = sample();
        no_dims["options"]["recordedEvent"]["data"]
            .as_object_mut()
            .unwrap()
            .remove("inputDimensions");
        assert!(parse(no_dims).detection_event().is_err());

        let mut no_detections = sample();
        no_detections["options"]["recordedEvent"]["data"]
            .as_object_mut()
            .unwrap()
            .remove("detections");
        assert!(parse(no_detections).detection_event().is_err());

        let bare = parse(json!({"notifier_id": "phone", "title": "x"}));
        assert!(bare.detection_event().is_err());

        let mut bad_box = sample();
        bad_box["options"]["recordedEvent"]["data"]["detections"][0]["boundingBox"] =
            json!([1, 2, 3]);
        assert!(parse(bad_box).detection_event().is_err());
    }

    #[test]
    fn unlabelled_boxes_are_kept() {
        let mut value = sample();
        value["options"]["recordedEvent"]["data"]["detections"][2]
            .as_object_mut()
            .unwrap()
            .remove("className");
        let event = parse(value).detection_event().expect("event");
        assert_eq!(event.objects.len(), 2);
        assert_eq!(event.objects[1].class_label, "");
        assert_eq!(event.objects[1].bounding_box, Rect::new(0.0, 0.0, 1.0, 1.0));
    }

    #[test]
    fn events_without_any_box_are_errors() {
        let mut value = sample();
        value["options"]["recordedEvent"]["data"]["detections"] =
            json!([{"className": "motion"}]);
        let err = parse(value).detection_event().unwrap_err();
        assert!(err.to_string().contains("boundingBox"));

        let mut empty = sample();
        empty["options"]["recordedEvent"]["data"]["detections"] = json!([]);
        assert!(parse(empty).detection_event().is_err());
    }

    #[test]
    fn rejects_blank_notifier() {
        assert!(Notification::from_slice(br#"{"notifier_id": " "}"#).is_err());
        assert!(Notification::from_slice(b"not json").is_err());
    }
}
