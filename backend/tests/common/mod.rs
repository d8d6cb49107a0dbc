#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

pub use visio_backend::ddb::{InstanceStore, MemoryInstanceStore, OrchestrationRecord};
pub use visio_backend::detector::{DetectorInvoker, DetectorSettings};
pub use visio_backend::storage::{MemoryObjectStore, ObjectStore};
pub use visio_backend::workflow::{DetectionActivity, Orchestrator};

/// Argument parsing shared by every stub. Leaves `$SOURCE`, `$PROJECT`, `$NAME`, `$OUT` and `$IMG`
/// set and records the received argument vector in `last_args.txt`.
const STUB_PRELUDE: &str = r#"#!/bin/sh
printf '%s\n' "$@" > last_args.txt
while [ $# -gt 0 ]; do
  case "$1" in
    --source) SOURCE="$2"; shift 2 ;;
    --weights) WEIGHTS="$2"; shift 2 ;;
    --conf) CONF="$2"; shift 2 ;;
    --project) PROJECT="$2"; shift 2 ;;
    --name) NAME="$2"; shift 2 ;;
    *) shift ;;
  esac
done
OUT="$PROJECT/$NAME"
mkdir -p "$OUT"
IMG=$(basename "$SOURCE")
"#;

/// Writes the annotated image and a CSV reporting `basketball,0.93`.
pub const DETECTS_BASKETBALL: &str = r#"cp "$SOURCE" "$OUT/$IMG"
printf '%s,basketball,0.93\n' "$IMG" > "$OUT/predictions.csv"
echo "1 basketball detected"
"#;

/// Writes the image but no CSV.
pub const WRITES_NO_CSV: &str = r#"cp "$SOURCE" "$OUT/$IMG"
echo "model weights missing" >&2
"#;

pub const WRITES_MALFORMED_CSV: &str = r#"cp "$SOURCE" "$OUT/$IMG"
printf 'garbage\n' > "$OUT/predictions.csv"
"#;

pub const EXITS_NONZERO_WITH_CSV: &str = r#"cp "$SOURCE" "$OUT/$IMG"
printf '%s,redball,0.40\n' "$IMG" > "$OUT/predictions.csv"
exit 3
"#;

pub const HANGS: &str = "sleep 30\n";

pub const SLOW_BASKETBALL: &str = r#"sleep 2
cp "$SOURCE" "$OUT/$IMG"
printf '%s,basketball,0.93\n' "$IMG" > "$OUT/predictions.csv"
"#;

pub struct Harness {
    pub temp: TempDir,
    pub script_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub source: Arc<MemoryObjectStore>,
    pub predictions: Arc<MemoryObjectStore>,
    pub instances: Arc<MemoryInstanceStore>,
    pub activity: Arc<DetectionActivity>,
    pub orchestrator: Orchestrator,
}

impl Harness {
    pub fn new(stub_body: &str) -> Self {
        Self::with_settings(stub_body, |_| {})
    }

    pub fn with_settings(stub_body: &str, tweak: impl FnOnce(&mut DetectorSettings)) -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        let script_dir = temp.path().join("yolov5");
        let scratch_dir = temp.path().join("image_set");
        std::fs::create_dir_all(&script_dir).expect("script dir");
        std::fs::write(script_dir.join("detect.sh"), format!("{}{}", STUB_PRELUDE, stub_body))
            .expect("write stub");

        let mut settings = DetectorSettings {
            interpreter: "sh".to_string(),
            entry_script: "detect.sh".to_string(),
            script_dir: script_dir.clone(),
            timeout_secs: 20,
            ..DetectorSettings::default()
        };
        tweak(&mut settings);

        let source = Arc::new(MemoryObjectStore::new());
        let predictions = Arc::new(MemoryObjectStore::new());
        let instances = Arc::new(MemoryInstanceStore::new());
        let activity = Arc::new(DetectionActivity::new(
            source.clone(),
            predictions.clone(),
            DetectorInvoker::new(settings),
            scratch_dir.clone(),
        ));
        let orchestrator = Orchestrator::new(activity.clone(), instances.clone());

        Self {
            temp,
            script_dir,
            scratch_dir,
            source,
            predictions,
            instances,
            activity,
            orchestrator,
        }
    }

    pub async fn add_source_image(&self, name: &str) {
        self.source
            .put(name, b"\xff\xd8\xff\xe0fake jpeg".to_vec())
            .await
            .expect("seed source image");
    }

    pub fn stub_was_invoked(&self) -> bool {
        self.script_dir.join("last_args.txt").exists()
    }

    pub fn last_args(&self) -> Vec<String> {
        std::fs::read_to_string(self.script_dir.join("last_args.txt"))
            .expect("stub args")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn payload(file_name: &str, detector_type: i64) -> String {
    format!(
        r#"{{"fileName":"{0}","sourceBlobUri":"http://x/{0}","detectorType":{1}}}"#,
        file_name, detector_type
    )
}
