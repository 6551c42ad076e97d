//! Stepwise experiment plans.
//!
//! A plan lists the steps of a prompt experiment: which prompt file each
//! step uses, which cases it runs and which output fields it expects.
//! Plans are YAML; Markdown plans are accepted but carry no steps yet.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LabError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(default)]
    pub step_name: Option<String>,
    #[serde(default)]
    pub prompt_file: Option<String>,
    #[serde(default)]
    pub experiment_cases: Vec<Value>,
    #[serde(default)]
    pub expected_output_fields: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PlanFile {
    #[serde(default)]
    plan_name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    steps: Vec<PlanStep>,
    #[serde(flatten)]
    meta: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepwisePlan {
    pub path: PathBuf,
    pub plan_name: Option<String>,
    pub description: Option<String>,
    /// Top-level keys besides the ones above.
    pub meta: Map<String, Value>,
    pub steps: Vec<PlanStep>,
}

impl StepwisePlan {
    /// Load a `.yaml`/`.yml` or `.md` plan. Other extensions are an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let file = match extension {
            "yaml" | "yml" => {
                let text = std::fs::read_to_string(path).map_err(|e| LabError::io(path, e))?;
                if text.trim().is_empty() {
                    PlanFile::default()
                } else {
                    serde_yaml::from_str(&text).map_err(|e| LabError::yaml(path, e))?
                }
            }
            "md" => PlanFile::default(),
            other => {
                return Err(LabError::Plan(format!(
                    "unsupported plan file type '.{other}' ({})",
                    path.display()
                )));
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            plan_name: file.plan_name,
            description: file.description,
            meta: file.meta,
            steps: file.steps,
        })
    }

    /// Step names in order; unnamed steps are `step_N`.
    pub fn list_steps(&self) -> Vec<String> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| step_label(step, i))
            .collect()
    }

    pub fn get_step(&self, name: &str) -> Option<&PlanStep> {
        self.steps
            .iter()
            .find(|step| step.step_name.as_deref() == Some(name))
    }

    /// Human-readable overview of the plan and each step.
    pub fn summary(&self) -> String {
        let mut out = format!("Stepwise plan: {}\n", self.path.display());
        if let Some(name) = &self.plan_name {
            let _ = writeln!(out, "Name: {name}");
        }
        if let Some(description) = &self.description {
            let _ = writeln!(out, "Description: {description}");
        }
        for (key, value) in &self.meta {
            let _ = writeln!(out, "{key}: {}", inline(value));
        }
        out.push_str("Steps:\n");
        if self.steps.is_empty() {
            out.push_str("  (none)\n");
        }
        for (i, step) in self.steps.iter().enumerate() {
            let _ = writeln!(out, "  {}. {}", i + 1, step_label(step, i));
            let _ = writeln!(
                out,
                "     Prompt: {}",
                step.prompt_file.as_deref().unwrap_or("(none)")
            );
            out.push_str("     Experiment cases:\n");
            for case in &step.experiment_cases {
                let _ = writeln!(out, "        - {}", inline(case));
            }
            let _ = writeln!(
                out,
                "     Expected fields: {}",
                step.expected_output_fields
                    .as_ref()
                    .map(inline)
                    .unwrap_or_else(|| "(none)".into())
            );
        }
        out
    }
}

fn step_label(step: &PlanStep, index: usize) -> String {
    step.step_name
        .clone()
        .unwrap_or_else(|| format!("step_{}", index + 1))
}

fn inline(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = "\
plan_name: clarifier v2
description: Tune the clarification prompt
owner: lab
steps:
  - step_name: baseline
    prompt_file: prompts/baseline.txt
    experiment_cases: [bundles/milk.yaml, bundles/plan.yaml]
    expected_output_fields: [clarity_score, interpreted_text]
  - prompt_file: prompts/strict.txt
";

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn yaml_plan_lists_steps() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StepwisePlan::load(write(dir.path(), "plan.yaml", PLAN)).unwrap();
        assert_eq!(plan.plan_name.as_deref(), Some("clarifier v2"));
        assert_eq!(plan.list_steps(), vec!["baseline", "step_2"]);
        assert_eq!(plan.meta["owner"], "lab");

        let step = plan.get_step("baseline").unwrap();
        assert_eq!(step.experiment_cases.len(), 2);
        assert!(plan.get_step("step_2").is_none());
    }

    #[test]
    fn summary_mentions_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StepwisePlan::load(write(dir.path(), "plan.yml", PLAN)).unwrap();
        let summary = plan.summary();
        assert!(summary.contains("  1. baseline\n     Prompt: prompts/baseline.txt"));
        assert!(summary.contains("        - bundles/milk.yaml"));
        assert!(summary.contains("Expected fields: [\"clarity_score\",\"interpreted_text\"]"));
        assert!(summary.contains("  2. step_2"));
    }

    #[test]
    fn markdown_plans_have_no_steps() {
        let dir = tempfile::tempdir().unwrap();
        let plan = StepwisePlan::load(write(dir.path(), "plan.md", "# Plan\n")).unwrap();
        assert!(plan.steps.is_empty());
        assert!(plan.summary().contains("(none)"));
    }

    #[test]
    fn other_extensions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = StepwisePlan::load(write(dir.path(), "plan.txt", PLAN)).unwrap_err();
        assert!(matches!(err, LabError::Plan(_)));
    }
}
