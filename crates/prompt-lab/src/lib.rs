//! Experiment harness for note-interpreter prompts.
//!
//! - [`validate`] compares a model's JSON output with the expected output.
//! - [`bundle`] runs self-contained experiment bundles (prompt, input,
//!   expected output) and records the result in the bundle file.
//! - [`plan`] reads stepwise plans that group bundles into steps.
//!
//! ```ignore
//! use prompt_lab::bundle::{DummyModel, run_bundle};
//! use prompt_lab::validate::ValidationOptions;
//!
//! let bundle = run_bundle("bundles/milk.yaml", &DummyModel, &ValidationOptions::new()).await?;
//! println!("{:?}", bundle.log);
//! ```

pub mod bundle;
pub mod error;
pub mod plan;
pub mod validate;

pub use bundle::{DummyModel, ExperimentBundle, LabModel, LlmModel, run_bundle};
pub use error::{LabError, Result};
pub use plan::{PlanStep, StepwisePlan};
pub use validate::{
    ValidationOptions, ValidationReport, ValidationStatus, validate_llm_reply, validate_output,
};
