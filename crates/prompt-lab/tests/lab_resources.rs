//! The shipped lab plan and bundles run end to end with the dummy model.

use std::fs;
use std::path::{Path, PathBuf};

use prompt_lab::bundle::{DummyModel, ExperimentBundle, run_bundle};
use prompt_lab::plan::StepwisePlan;
use prompt_lab::validate::{ValidationOptions, ValidationStatus};

fn lab_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../resources/lab")
}

/// Copy the lab tree so running bundles does not touch the checked-in files.
fn copy_lab(to: &Path) {
    for sub in ["bundles", "prompts", "plans"] {
        let from = lab_dir().join(sub);
        fs::create_dir_all(to.join(sub)).unwrap();
        for entry in fs::read_dir(&from).unwrap() {
            let entry = entry.unwrap();
            fs::copy(entry.path(), to.join(sub).join(entry.file_name())).unwrap();
        }
    }
}

#[tokio::test]
async fn every_case_in_the_baseline_plan_passes() {
    let dir = tempfile::tempdir().unwrap();
    copy_lab(dir.path());
    let plans = dir.path().join("plans");

    let plan = StepwisePlan::load(plans.join("dummy_baseline.yaml")).unwrap();
    assert_eq!(plan.list_steps(), vec!["echo"]);
    let step = plan.get_step("echo").unwrap();

    for case in &step.experiment_cases {
        let bundle_path = plans.join(case.as_str().unwrap());
        let bundle = run_bundle(&bundle_path, &DummyModel, &ValidationOptions::new())
            .await
            .unwrap();
        let report = bundle.validation.unwrap().result.unwrap();
        assert!(report.passed(), "{}: {report:?}", bundle_path.display());
    }

    let saved = ExperimentBundle::load(dir.path().join("bundles/milk.yaml")).unwrap();
    assert_eq!(saved.log.unwrap().status, Some(ValidationStatus::Passed));
    assert!(saved.extra.contains_key("name"));
}

#[tokio::test]
async fn strict_mode_fails_on_the_extra_score() {
    let dir = tempfile::tempdir().unwrap();
    copy_lab(dir.path());
    let path = dir.path().join("bundles/plants.yaml");

    let opts = ValidationOptions::new().with_strict(true);
    let bundle = run_bundle(&path, &DummyModel, &opts).await.unwrap();
    let report = bundle.validation.unwrap().result.unwrap();
    assert_eq!(report.status, ValidationStatus::Failed);
    assert_eq!(report.unexpected_fields, vec!["clarity_score"]);
}
