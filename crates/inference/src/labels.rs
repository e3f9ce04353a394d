use std::collections::BTreeMap;

/// Upper bound on class ids accepted from model metadata.
const MAX_CLASSES: usize = 10_000;

const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Class id to human readable label table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
    names: Vec<String>,
}

impl ClassNames {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// The 80 COCO categories, in the order YOLO models are trained on.
    pub fn coco() -> Self {
        Self::new(COCO_CLASSES.iter().map(|s| s.to_string()).collect())
    }

    /// Parse the `names` metadata entry written by YOLO exporters, a mapping
    /// literal such as `{0: 'person', 1: 'bicycle'}`.
    ///
    /// Ids missing from the mapping are filled with `class_<id>`. Returns
    /// `None` for empty or malformed input and for ids of `MAX_CLASSES` or more.
    pub fn from_metadata(raw: &str) -> Option<Self> {
        let body = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
        let mut entries = BTreeMap::new();
        let mut chars = body.chars().peekable();

        loop {
            while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
            if chars.peek().is_none() {
                break;
            }

            let mut id = String::new();
            while let Some(c) = chars.next_if(|c| *c != ':') {
                id.push(c);
            }
            let id: usize = id.trim().parse().ok()?;
            if id >= MAX_CLASSES {
                return None;
            }
            chars.next_if_eq(&':')?;
            while chars.next_if(|c| c.is_whitespace()).is_some() {}

            let quote = chars.next_if(|c| *c == '\'' || *c == '"')?;
            let mut name = String::new();
            loop {
                match chars.next()? {
                    c if c == quote => break,
                    '\\' => name.push(chars.next()?),
                    c => name.push(c),
                }
            }
            entries.insert(id, name);
        }

        let max_id = *entries.keys().next_back()?;
        let names = (0..=max_id)
            .map(|id| {
                entries
                    .remove(&id)
                    .unwrap_or_else(|| format!("class_{}", id))
            })
            .collect();

        Some(Self::new(names))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn label(&self, class_id: u32) -> String {
        self.names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl Default for ClassNames {
    fn default() -> Self {
        Self::coco()
    }
}
