//! End-to-end runs against a fake ISIS toolchain made of shell scripts.

#![cfg(unix)]

use lronac_mosaic::{run_pipeline, AcquisitionId, Config, PipelineError, PipelineOutcome};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Records the call, then creates the `to=` file.
const TOUCH_TOOL: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$(dirname "$0")/calls.log"
for arg in "$@"; do
  case "$arg" in
    to=*) : > "${arg#to=}" ;;
  esac
done
"#;

/// Like TOUCH_TOOL, and also leaves a log beside its input.
const CALIBRATE_TOOL: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$(dirname "$0")/calls.log"
for arg in "$@"; do
  case "$arg" in
    from=*) from="${arg#from=}"; : > "${from%.cub}.lronaccal.log" ;;
    to=*) : > "${arg#to=}" ;;
  esac
done
"#;

const RECORD_TOOL: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$(dirname "$0")/calls.log"
"#;

const JITREG_TOOL: &str = r#"#!/bin/sh
echo "$(basename "$0") $*" >> "$(dirname "$0")/calls.log"
log=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--rowLog" ]; then log="$2"; fi
  shift
done
printf 'Average Sample Offset: 2.4 StdDev: 0.1\nAverage Line Offset: -1.6 StdDev: 0.2\n' > "$log"
"#;

const FAILING_TOOL: &str = "#!/bin/sh\necho \"echo table missing\" >&2\nexit 3\n";

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir(&bin).unwrap();

        for tool in ["lronac2isis", "lronacecho", "noproj", "cubenorm"] {
            write_script(&bin.join(tool), TOUCH_TOOL);
        }
        write_script(&bin.join("lronaccal"), CALIBRATE_TOOL);
        for tool in ["spiceinit", "spicefit", "handmos"] {
            write_script(&bin.join(tool), RECORD_TOOL);
        }
        write_script(&bin.join("lronacjitreg"), JITREG_TOOL);

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.tools.bin_dir = Some(self.path("bin"));
        config.processing.threads = 2;
        config.processing.check_environment = false;
        config
    }

    fn images(&self) -> Vec<PathBuf> {
        ["M000000100LE.IMG", "M000000100RE.IMG", "M000000200LE.IMG", "M000000200RE.IMG"]
            .iter()
            .map(|name| {
                let path = self.path(name);
                std::fs::write(&path, b"edr").unwrap();
                path
            })
            .collect()
    }

    fn replace_tool(&self, name: &str, body: &str) {
        write_script(&self.path("bin").join(name), body);
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.path("bin/calls.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn calls_to(&self, tool: &str) -> Vec<String> {
        let prefix = format!("{tool} ");
        self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
    }

    fn clear_calls(&self) {
        let _ = std::fs::remove_file(self.path("bin/calls.log"));
    }
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[tokio::test]
async fn test_full_run_produces_normalized_mosaics() {
    let ws = Workspace::new();
    let images = ws.images();

    let report = run_pipeline(ws.config(), images).await.unwrap();

    let PipelineOutcome::Completed { normalized } = &report.outcome else {
        panic!("expected a completed run, got {:?}", report.outcome);
    };
    assert_eq!(normalized.len(), 2);
    assert_eq!(
        normalized[&AcquisitionId(100)],
        ws.path("M000000100LE.lronacecho.noproj.mosaic.norm.cub")
    );
    for path in normalized.values() {
        assert!(path.exists(), "{} missing", path.display());
    }

    assert_eq!(report.calibrated.len(), 4);
    assert!(ws.path("M000000200RE.lronaccal.cub").exists());
    assert!(ws.path("rowLog_000000100.txt").exists());

    // 4 images through six 1:1 stages, then 2 pairs through three more
    assert_eq!(report.stats.jobs_submitted, 4 * 6 + 2 * 3);
    assert_eq!(report.stats.outputs_skipped, 0);
    assert!(report.stats.peak_concurrent_jobs <= 2);
}

#[tokio::test]
async fn test_mosaic_places_right_ccd_at_rounded_offsets() {
    let ws = Workspace::new();
    run_pipeline(ws.config(), ws.images()).await.unwrap();

    let handmos = ws.calls_to("handmos");
    assert_eq!(handmos.len(), 2);
    let first = handmos
        .iter()
        .find(|c| c.contains("M000000100RE"))
        .expect("handmos call for acquisition 100");
    assert!(first.contains(&format!(
        "from={}",
        ws.path("M000000100RE.lronacecho.noproj.cub").display()
    )));
    assert!(first.contains(&format!(
        "mosaic={}",
        ws.path("M000000100LE.lronacecho.noproj.mosaic.cub").display()
    )));
    assert!(first.contains("outsample=4902 insample=4900 outline=-2"));
    assert!(first.contains("priority=ontop"));
}

#[tokio::test]
async fn test_stages_run_in_order() {
    let ws = Workspace::new();
    run_pipeline(ws.config(), ws.images()).await.unwrap();

    let order: Vec<String> = ws
        .calls()
        .iter()
        .filter_map(|c| c.split_whitespace().next().map(str::to_string))
        .fold(Vec::new(), |mut acc, tool| {
            if acc.last() != Some(&tool) {
                acc.push(tool);
            }
            acc
        });
    assert_eq!(
        order,
        vec![
            "lronac2isis",
            "spiceinit",
            "spicefit",
            "lronaccal",
            "lronacecho",
            "noproj",
            "lronacjitreg",
            "handmos",
            "cubenorm",
        ]
    );
}

#[tokio::test]
async fn test_stop_after_noproj_skips_later_stages() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.processing.stop_after_noproj = true;

    let report = run_pipeline(config, ws.images()).await.unwrap();

    let PipelineOutcome::StoppedAfterNoproj { pairs } = &report.outcome else {
        panic!("expected an early stop, got {:?}", report.outcome);
    };
    assert_eq!(pairs.len(), 2);
    assert!(ws.path("M000000200RE.lronacecho.noproj.cub").exists());

    assert_eq!(ws.calls_to("noproj").len(), 4);
    assert!(ws.calls_to("lronacjitreg").is_empty());
    assert!(ws.calls_to("handmos").is_empty());
    assert!(ws.calls_to("cubenorm").is_empty());
}

#[tokio::test]
async fn test_delete_removes_intermediates() {
    let ws = Workspace::new();
    let mut config = ws.config();
    config.processing.delete_intermediate = true;

    run_pipeline(config, ws.images()).await.unwrap();

    for side in ["LE", "RE"] {
        let stem = format!("M000000100{side}");
        assert!(!ws.path(&format!("{stem}.cub")).exists());
        assert!(!ws.path(&format!("{stem}.lronaccal.log")).exists());
        assert!(!ws.path(&format!("{stem}.lronacecho.cub")).exists());
        assert!(!ws.path(&format!("{stem}.lronacecho.noproj.cub")).exists());
        assert!(ws.path(&format!("{stem}.lronaccal.cub")).exists());
        assert!(ws.path(&format!("{stem}.IMG")).exists());
    }
    assert!(!ws.path("M000000100LE.lronacecho.noproj.mosaic.cub").exists());
    assert!(ws.path("M000000100LE.lronacecho.noproj.mosaic.norm.cub").exists());
}

#[tokio::test]
async fn test_keep_leaves_intermediates() {
    let ws = Workspace::new();
    run_pipeline(ws.config(), ws.images()).await.unwrap();

    assert!(ws.path("M000000100LE.cub").exists());
    assert!(ws.path("M000000100LE.lronaccal.log").exists());
    assert!(ws.path("M000000100LE.lronacecho.cub").exists());
    assert!(ws.path("M000000100LE.lronacecho.noproj.mosaic.cub").exists());
}

#[tokio::test]
async fn test_rerun_only_repeats_in_place_tools() {
    let ws = Workspace::new();
    let images = ws.images();
    run_pipeline(ws.config(), images.clone()).await.unwrap();
    ws.clear_calls();

    let report = run_pipeline(ws.config(), images).await.unwrap();

    // spiceinit/spicefit update cubes in place and have no output to check
    assert_eq!(report.stats.jobs_submitted, 8);
    assert_eq!(report.stats.outputs_skipped, 4 * 6 + 2 * 3 - 8);
    for call in ws.calls() {
        assert!(call.starts_with("spiceinit ") || call.starts_with("spicefit "), "{call}");
    }
}

#[tokio::test]
async fn test_failing_tool_halts_pipeline() {
    let ws = Workspace::new();
    ws.replace_tool("lronacecho", FAILING_TOOL);

    let err = run_pipeline(ws.config(), ws.images()).await.unwrap_err();

    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::JobFailed {
            stage,
            code,
            stderr,
            ..
        }) => {
            assert_eq!(stage, "lronacecho");
            assert_eq!(*code, Some(3));
            assert!(stderr.contains("echo table missing"));
        }
        other => panic!("expected JobFailed, got {other:?}"),
    }
    assert!(ws.calls_to("noproj").is_empty());
    assert!(!ws.path("M000000100LE.lronacecho.cub").exists());
}

#[tokio::test]
async fn test_unpaired_image_fails_at_noproj() {
    let ws = Workspace::new();
    let mut images = ws.images();
    images.truncate(3);

    let err = run_pipeline(ws.config(), images).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::IncompletePair {
            id: AcquisitionId(200),
            ..
        })
    ));
    assert!(ws.calls_to("noproj").is_empty());
}

#[tokio::test]
async fn test_missing_input_rejected_before_processing() {
    let ws = Workspace::new();
    let mut images = ws.images();
    images.push(ws.path("M000000300LE.IMG"));

    assert!(run_pipeline(ws.config(), images).await.is_err());
    assert!(ws.calls().is_empty());
}

#[tokio::test]
async fn test_unmatched_correlation_stops_before_mosaic() {
    let ws = Workspace::new();
    ws.replace_tool(
        "lronacjitreg",
        &JITREG_TOOL.replace("2.4 StdDev: 0.1", "nan StdDev: nan"),
    );

    let err = run_pipeline(ws.config(), ws.images()).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::OffsetParse { .. })
    ));
    assert!(ws.calls_to("handmos").is_empty());
}
