use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::Rect;

/// One classified detection from an upstream object detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Detector label (person, car, dog, ...). Open-ended; vocabularies vary by model.
    pub class_label: String,
    /// Bounding box in normalized (0..1) frame coordinates.
    pub bounding_box: Rect,
    #[serde(default)]
    pub score: Option<f64>,
}

impl DetectedObject {
    pub fn new(class_label: impl Into<String>, bounding_box: Rect) -> Self {
        Self {
            class_label: class_label.into(),
            bounding_box,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// A detection event for one camera.
///
/// `metadata` is opaque to the filter and forwarded unchanged when the
/// notification is allowed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub camera_id: String,
    /// Milliseconds since the Unix epoch, as reported by the detector.
    pub timestamp_ms: u64,
    pub objects: Vec<DetectedObject>,
    #[serde(default)]
    pub metadata: Value,
}

impl DetectionEvent {
    pub fn new(camera_id: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            camera_id: camera_id.into(),
            timestamp_ms,
            objects: Vec::new(),
            metadata: Value::Null,
        }
    }

    pub fn with_object(mut self, object: DetectedObject) -> Self {
        self.objects.push(object);
        self
    }
}
