//! Detector label vocabulary.
//!
//! COCO labels grouped into coarse categories, plus the `package` and `face`
//! labels emitted by common NVR detectors. Used to build zone class filters
//! from categories; the filter itself still matches exact labels.

const COCO_CLASSES: &[(&str, &str)] = &[
    ("person", "person"),
    ("bicycle", "vehicle"),
    ("car", "vehicle"),
    ("motorcycle", "vehicle"),
    ("airplane", "vehicle"),
    ("bus", "vehicle"),
    ("train", "vehicle"),
    ("truck", "vehicle"),
    ("boat", "vehicle"),
    ("traffic light", "outdoor"),
    ("fire hydrant", "outdoor"),
    ("stop sign", "outdoor"),
    ("parking meter", "outdoor"),
    ("bench", "outdoor"),
    ("bird", "animal"),
    ("cat", "animal"),
    ("dog", "animal"),
    ("horse", "animal"),
    ("sheep", "animal"),
    ("cow", "animal"),
    ("elephant", "animal"),
    ("bear", "animal"),
    ("zebra", "animal"),
    ("giraffe", "animal"),
    ("backpack", "accessory"),
    ("umbrella", "accessory"),
    ("handbag", "accessory"),
    ("tie", "accessory"),
    ("suitcase", "accessory"),
    ("frisbee", "sports"),
    ("skis", "sports"),
    ("snowboard", "sports"),
    ("sports ball", "sports"),
    ("kite", "sports"),
    ("baseball bat", "sports"),
    ("baseball glove", "sports"),
    ("skateboard", "sports"),
    ("surfboard", "sports"),
    ("tennis racket", "sports"),
    ("bottle", "kitchen"),
    ("wine glass", "kitchen"),
    ("cup", "kitchen"),
    ("fork", "kitchen"),
    ("knife", "kitchen"),
    ("spoon", "kitchen"),
    ("bowl", "kitchen"),
    ("banana", "food"),
    ("apple", "food"),
    ("sandwich", "food"),
    ("orange", "food"),
    ("broccoli", "food"),
    ("carrot", "food"),
    ("hot dog", "food"),
    ("pizza", "food"),
    ("donut", "food"),
    ("cake", "food"),
    ("chair", "furniture"),
    ("couch", "furniture"),
    ("potted plant", "furniture"),
    ("bed", "furniture"),
    ("dining table", "furniture"),
    ("toilet", "furniture"),
    ("tv", "electronic"),
    ("laptop", "electronic"),
    ("mouse", "electronic"),
    ("remote", "electronic"),
    ("keyboard", "electronic"),
    ("cell phone", "electronic"),
    ("microwave", "appliance"),
    ("oven", "appliance"),
    ("toaster", "appliance"),
    ("sink", "appliance"),
    ("refrigerator", "appliance"),
    ("book", "indoor"),
    ("clock", "indoor"),
    ("vase", "indoor"),
    ("scissors", "indoor"),
    ("teddy bear", "indoor"),
    ("hair drier", "indoor"),
    ("toothbrush", "indoor"),
];

/// Labels that are their own category.
const STANDALONE_LABELS: &[&str] = &["package", "face"];

/// All known labels, sorted and deduplicated.
pub fn labels() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = COCO_CLASSES
        .iter()
        .map(|(label, _)| *label)
        .chain(STANDALONE_LABELS.iter().copied())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// All known categories, sorted and deduplicated.
pub fn categories() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = COCO_CLASSES
        .iter()
        .map(|(_, category)| *category)
        .chain(STANDALONE_LABELS.iter().copied())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Best guess whether a detector label belongs to a category.
///
/// Case-insensitive. A `face` is also a `person`.
pub fn label_matches_category(label: &str, category: &str) -> bool {
    let label = label.to_lowercase();
    let category = category.to_lowercase();

    if STANDALONE_LABELS.contains(&label.as_str()) && label == category {
        return true;
    }
    if label == "face" && category == "person" {
        return true;
    }

    COCO_CLASSES
        .iter()
        .any(|(l, c)| *l == label && *c == category)
}

/// Every known label belonging to a category.
pub fn labels_in_category(category: &str) -> Vec<&'static str> {
    let mut out: Vec<&'static str> = labels()
        .into_iter()
        .filter(|label| label_matches_category(label, category))
        .collect();
    out.sort_unstable();
    out
}
