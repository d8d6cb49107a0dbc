use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, EnumIter, EnumString};

/// Detection backends a request can ask for. Only `YoloV5` has a runnable detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, AsRefStr)]
pub enum DetectorType {
    YoloV5,
    #[strum(serialize = "SSD")]
    Ssd,
    #[strum(serialize = "MaskRCNN")]
    MaskRcnn,
    Unknown,
}

impl DetectorType {
    pub fn code(self) -> u8 {
        match self {
            DetectorType::YoloV5 => 0,
            DetectorType::Ssd => 1,
            DetectorType::MaskRcnn => 2,
            DetectorType::Unknown => 3,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => DetectorType::YoloV5,
            1 => DetectorType::Ssd,
            2 => DetectorType::MaskRcnn,
            _ => DetectorType::Unknown,
        }
    }

    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if let Ok(code) = name.parse::<i64>() {
            return Self::from_code(code);
        }
        let normalized = name.replace('_', "");
        DetectorType::iter()
            .find(|variant| variant.as_ref().eq_ignore_ascii_case(&normalized))
            .unwrap_or(DetectorType::Unknown)
    }

    /// Total decoding from an arbitrary JSON value. Anything unrecognised is `Unknown`.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_i64().map(Self::from_code).unwrap_or(DetectorType::Unknown),
            Value::String(s) => Self::from_name(s),
            _ => DetectorType::Unknown,
        }
    }

    /// Prefix prepended to artifact file names produced by this detector.
    pub fn artifact_prefix(self) -> &'static str {
        match self {
            DetectorType::YoloV5 => "yolov5_",
            DetectorType::Ssd => "ssd_",
            DetectorType::MaskRcnn => "mask-rcnn_",
            DetectorType::Unknown => "nan_",
        }
    }

    pub fn is_implemented(self) -> bool {
        matches!(self, DetectorType::YoloV5)
    }
}

impl Serialize for DetectorType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for DetectorType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, EnumIter, AsRefStr)]
pub enum PredictionClass {
    #[strum(serialize = "basketball")]
    Basketball,
    #[strum(serialize = "redball")]
    Redball,
    #[default]
    Unknown,
}

impl PredictionClass {
    pub fn code(self) -> u8 {
        match self {
            PredictionClass::Basketball => 0,
            PredictionClass::Redball => 1,
            PredictionClass::Unknown => 99,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => PredictionClass::Basketball,
            1 => PredictionClass::Redball,
            _ => PredictionClass::Unknown,
        }
    }

    /// Case-insensitive label lookup; unrecognised labels map to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        PredictionClass::iter()
            .find(|variant| variant.as_ref().eq_ignore_ascii_case(label))
            .unwrap_or(PredictionClass::Unknown)
    }
}

impl Serialize for PredictionClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for PredictionClass {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Number(n) => n.as_i64().map(Self::from_code).unwrap_or_default(),
            Value::String(s) => Self::from_label(&s),
            _ => PredictionClass::Unknown,
        })
    }
}

/// Inbound detection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRequest {
    pub file_name: String,
    #[serde(rename = "sourceBlobUri", alias = "sourceUri")]
    pub source_uri: String,
    pub detector_type: DetectorType,
}

impl DetectionRequest {
    pub fn new(file_name: impl Into<String>, source_uri: impl Into<String>, detector_type: DetectorType) -> Self {
        Self {
            file_name: file_name.into(),
            source_uri: source_uri.into(),
            detector_type,
        }
    }
}

/// Published detection artifact: the tagged file name and where it was written locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArtifact {
    pub name: String,
    pub path: String,
}

/// Outcome of one detection request, successful or not.
///
/// `has_errors()` is true exactly when `errors()` is `Some`, and a failed result never carries
/// artifact fields or a prediction score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PredictionResultWire", into = "PredictionResultWire")]
pub struct PredictionResult {
    image_name: String,
    detector_type: DetectorType,
    classification: PredictionClass,
    artifact: Option<ResultArtifact>,
    prediction: f64,
    errors: Option<String>,
    time_taken: Duration,
}

const UNSPECIFIED_ERROR: &str = "unspecified error";

impl PredictionResult {
    pub fn success(
        image_name: impl Into<String>,
        detector_type: DetectorType,
        classification: PredictionClass,
        prediction: f64,
        artifact: ResultArtifact,
        time_taken: Duration,
    ) -> Self {
        Self {
            image_name: image_name.into(),
            detector_type,
            classification,
            artifact: Some(artifact),
            prediction,
            errors: None,
            time_taken,
        }
    }

    pub fn failure(image_name: impl Into<String>, detector_type: DetectorType, errors: impl Into<String>) -> Self {
        let errors = errors.into();
        let errors = if errors.trim().is_empty() {
            UNSPECIFIED_ERROR.to_string()
        } else {
            errors
        };
        Self {
            image_name: image_name.into(),
            detector_type,
            classification: PredictionClass::Unknown,
            artifact: None,
            prediction: 0.0,
            errors: Some(errors),
            time_taken: Duration::ZERO,
        }
    }

    pub fn with_time_taken(mut self, time_taken: Duration) -> Self {
        self.time_taken = time_taken;
        self
    }

    pub fn image_name(&self) -> &str {
        &self.image_name
    }

    pub fn detector_type(&self) -> DetectorType {
        self.detector_type
    }

    pub fn classification(&self) -> PredictionClass {
        self.classification
    }

    pub fn result_image_name(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.name.as_str())
    }

    pub fn result_image_path(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.path.as_str())
    }

    pub fn prediction(&self) -> f64 {
        self.prediction
    }

    pub fn errors(&self) -> Option<&str> {
        self.errors.as_deref()
    }

    pub fn has_errors(&self) -> bool {
        self.errors.is_some()
    }

    pub fn time_taken(&self) -> Duration {
        self.time_taken
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictionResultWire {
    image_name: String,
    #[serde(default)]
    result_img_name: Option<String>,
    #[serde(default)]
    result_img_path: Option<String>,
    detector_type: DetectorType,
    #[serde(default)]
    prediction_class: PredictionClass,
    #[serde(default)]
    prediction: f64,
    #[serde(default)]
    errors: Option<String>,
    #[serde(default)]
    has_errors: bool,
    #[serde(default)]
    time_taken: f64,
}

impl From<PredictionResult> for PredictionResultWire {
    fn from(result: PredictionResult) -> Self {
        let has_errors = result.has_errors();
        let (result_img_name, result_img_path) = match result.artifact {
            Some(artifact) => (Some(artifact.name), Some(artifact.path)),
            None => (None, None),
        };
        Self {
            image_name: result.image_name,
            result_img_name,
            result_img_path,
            detector_type: result.detector_type,
            prediction_class: result.classification,
            prediction: result.prediction,
            errors: result.errors,
            has_errors,
            time_taken: result.time_taken.as_secs_f64(),
        }
    }
}

impl From<PredictionResultWire> for PredictionResult {
    fn from(wire: PredictionResultWire) -> Self {
        let time_taken = Duration::try_from_secs_f64(wire.time_taken).unwrap_or_default();
        let errors = wire.errors.filter(|e| !e.trim().is_empty());
        match errors {
            Some(errors) => {
                PredictionResult::failure(wire.image_name, wire.detector_type, errors).with_time_taken(time_taken)
            }
            None if wire.has_errors => {
                PredictionResult::failure(wire.image_name, wire.detector_type, UNSPECIFIED_ERROR)
                    .with_time_taken(time_taken)
            }
            None => PredictionResult {
                image_name: wire.image_name,
                detector_type: wire.detector_type,
                classification: wire.prediction_class,
                artifact: match (wire.result_img_name, wire.result_img_path) {
                    (Some(name), Some(path)) => Some(ResultArtifact { name, path }),
                    _ => None,
                },
                prediction: wire.prediction,
                errors: None,
                time_taken,
            },
        }
    }
}

/// Lifecycle of one orchestration instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, EnumString, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestrationStatus {
    Pending,
    Dispatched,
    AwaitingActivity,
    Completed,
    Failed,
}

impl Default for OrchestrationStatus {
    fn default() -> Self {
        OrchestrationStatus::Pending
    }
}

impl OrchestrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrchestrationStatus::Completed | OrchestrationStatus::Failed)
    }

    pub fn can_transition_to(self, next: OrchestrationStatus) -> bool {
        use OrchestrationStatus::*;
        matches!(
            (self, next),
            (Pending, Dispatched)
                | (Pending, Failed)
                | (Dispatched, AwaitingActivity)
                | (Dispatched, Failed)
                | (AwaitingActivity, Completed)
                | (AwaitingActivity, Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detector_type_decoding_is_total() {
        assert_eq!(DetectorType::from_json(&json!(0)), DetectorType::YoloV5);
        assert_eq!(DetectorType::from_json(&json!(2)), DetectorType::MaskRcnn);
        assert_eq!(DetectorType::from_json(&json!(42)), DetectorType::Unknown);
        assert_eq!(DetectorType::from_json(&json!(-1)), DetectorType::Unknown);
        assert_eq!(DetectorType::from_json(&json!(1.5)), DetectorType::Unknown);
        assert_eq!(DetectorType::from_json(&json!("ssd")), DetectorType::Ssd);
        assert_eq!(DetectorType::from_json(&json!("Mask_R_CNN")), DetectorType::MaskRcnn);
        assert_eq!(DetectorType::from_json(&json!("1")), DetectorType::Ssd);
        assert_eq!(DetectorType::from_json(&json!(null)), DetectorType::Unknown);
        assert_eq!(DetectorType::from_json(&json!({"a": 1})), DetectorType::Unknown);
    }

    #[test]
    fn request_decodes_from_inbound_payload() {
        let payload = r#"{"fileName":"a.jpg","sourceBlobUri":"http://x/a.jpg","detectorType":7}"#;
        let request: DetectionRequest = serde_json::from_str(payload).unwrap();
        assert_eq!(request.file_name, "a.jpg");
        assert_eq!(request.source_uri, "http://x/a.jpg");
        assert_eq!(request.detector_type, DetectorType::Unknown);

        let aliased = r#"{"fileName":"b.png","sourceUri":"http://x/b.png","detectorType":0}"#;
        let request: DetectionRequest = serde_json::from_str(aliased).unwrap();
        assert_eq!(request.detector_type, DetectorType::YoloV5);
    }

    #[test]
    fn request_missing_field_names_the_field() {
        let err = serde_json::from_str::<DetectionRequest>(r#"{"fileName":"a.jpg","detectorType":0}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("sourceBlobUri"), "{err}");
    }

    #[test]
    fn prediction_class_labels_match_case_insensitively() {
        assert_eq!(PredictionClass::from_label("REDBALL"), PredictionClass::Redball);
        assert_eq!(PredictionClass::from_label(" Basketball "), PredictionClass::Basketball);
        assert_eq!(PredictionClass::from_label("unknown_label"), PredictionClass::Unknown);
    }

    #[test]
    fn failure_result_serializes_outbound_shape() {
        let result = PredictionResult::failure("a.jpg", DetectorType::Ssd, "the detector type is incorrect");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "imageName": "a.jpg",
                "resultImgName": null,
                "resultImgPath": null,
                "detectorType": 1,
                "predictionClass": 99,
                "prediction": 0.0,
                "errors": "the detector type is incorrect",
                "hasErrors": true,
                "timeTaken": 0.0
            })
        );
    }

    #[test]
    fn success_result_round_trips() {
        let result = PredictionResult::success(
            "a.jpg",
            DetectorType::YoloV5,
            PredictionClass::Basketball,
            0.93,
            ResultArtifact {
                name: "yolov5_a_1.jpg".into(),
                path: "/tmp/yolov5_a_1.jpg".into(),
            },
            Duration::from_millis(1500),
        );
        let text = serde_json::to_string(&result).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["predictionClass"], json!(0));
        assert_eq!(value["hasErrors"], json!(false));
        assert_eq!(value["timeTaken"], json!(1.5));
        let back: PredictionResult = serde_json::from_str(&text).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn has_errors_follows_errors_field() {
        let empty = PredictionResult::failure("a.jpg", DetectorType::YoloV5, "  ");
        assert!(empty.has_errors());
        assert_eq!(empty.errors(), Some(UNSPECIFIED_ERROR));

        let inconsistent: PredictionResult = serde_json::from_value(json!({
            "imageName": "a.jpg",
            "detectorType": 0,
            "hasErrors": true,
            "errors": null
        }))
        .unwrap();
        assert!(inconsistent.has_errors());
        assert!(inconsistent.errors().is_some());

        let blank_errors: PredictionResult = serde_json::from_value(json!({
            "imageName": "a.jpg",
            "detectorType": 0,
            "errors": ""
        }))
        .unwrap();
        assert!(!blank_errors.has_errors());
        assert!(blank_errors.errors().is_none());
    }

    #[test]
    fn status_transitions() {
        use OrchestrationStatus::*;
        assert!(Pending.can_transition_to(Dispatched));
        assert!(Pending.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Dispatched.can_transition_to(AwaitingActivity));
        assert!(AwaitingActivity.can_transition_to(Completed));
        for next in OrchestrationStatus::iter() {
            assert!(!Completed.can_transition_to(next));
            assert!(!Failed.can_transition_to(next));
        }
        assert_eq!(AwaitingActivity.as_ref(), "AWAITING_ACTIVITY");
        assert_eq!("AWAITING_ACTIVITY".parse::<OrchestrationStatus>().unwrap(), AwaitingActivity);
    }
}
