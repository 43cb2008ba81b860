//! Seam to the detection/ML stack the scorer is built on.
//!
//! The stack is a black box that either imports as a unit or doesn't, and
//! that can build a scorer from a weights file. The bundled implementation
//! runs ONNX models through tract when the `onnx` feature is enabled.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::compat::{CompatPatches, NumericRuntime};

/// Why the detection stack could not be imported. The text is reported
/// verbatim through `/status` and the scoring endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ImportError(pub String);

/// A loaded scoring model. Inference lives with the external scorer; the
/// service only needs to hold on to it.
pub trait Scorer: Send + Sync + fmt::Debug {
    fn backend(&self) -> &str;
    fn describe(&self) -> String;
}

pub trait DetectionStack: NumericRuntime + Send + Sync {
    fn name(&self) -> &str;
    /// Attempted exactly once per process, after the compatibility shim.
    fn import(&self, patches: &CompatPatches) -> Result<(), ImportError>;
    fn build_scorer(&self, model_path: &Path) -> anyhow::Result<Arc<dyn Scorer>>;
}

/// Runs ONNX weights through tract.
///
/// Its numeric runtime is tract itself, so `numeric_version` reports the
/// linked tract line and `import` ignores the shim's patches. The
/// `_ARRAY_API` placeholder only matters for stacks whose numeric runtime
/// reports the configured incompatible major version.
#[derive(Debug, Default, Clone)]
pub struct OnnxStack;

#[cfg(feature = "onnx")]
const TRACT_VERSION: &str = "0.21";

impl NumericRuntime for OnnxStack {
    #[cfg(feature = "onnx")]
    fn numeric_version(&self) -> anyhow::Result<String> { Ok(TRACT_VERSION.to_string()) }

    #[cfg(not(feature = "onnx"))]
    fn numeric_version(&self) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("tract runtime not linked into this build"))
    }
}

impl DetectionStack for OnnxStack {
    fn name(&self) -> &str { "onnx" }

    #[cfg(feature = "onnx")]
    fn import(&self, _patches: &CompatPatches) -> Result<(), ImportError> {
        // building the framework registers every op, a cheap smoke test of the linkage
        let _ = tract_onnx::onnx();
        Ok(())
    }

    #[cfg(not(feature = "onnx"))]
    fn import(&self, _patches: &CompatPatches) -> Result<(), ImportError> {
        Err(ImportError("detection stack `onnx` is not compiled in; rebuild referee-api with `--features onnx`".into()))
    }

    #[cfg(feature = "onnx")]
    fn build_scorer(&self, model_path: &Path) -> anyhow::Result<Arc<dyn Scorer>> {
        Ok(Arc::new(onnx::OnnxScorer::load(model_path)?))
    }

    #[cfg(not(feature = "onnx"))]
    fn build_scorer(&self, model_path: &Path) -> anyhow::Result<Arc<dyn Scorer>> {
        Err(anyhow::anyhow!("cannot load {}: onnx support not compiled in", model_path.display()))
    }
}

#[cfg(feature = "onnx")]
mod onnx {
    use super::Scorer;
    use std::fmt;
    use std::path::{Path, PathBuf};
    use tract_onnx::prelude::*;

    pub struct OnnxScorer {
        path: PathBuf,
        plan: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    }

    impl OnnxScorer {
        pub fn load(path: &Path) -> anyhow::Result<Self> {
            let plan = tract_onnx::onnx()
                .model_for_path(path)?
                .into_optimized()?
                .into_runnable()?;
            Ok(Self { path: path.to_path_buf(), plan })
        }
    }

    impl fmt::Debug for OnnxScorer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("OnnxScorer").field("path", &self.path).finish_non_exhaustive()
        }
    }

    impl Scorer for OnnxScorer {
        fn backend(&self) -> &str { "onnx" }
        fn describe(&self) -> String {
            let model = self.plan.model();
            format!("{} ({} inputs, {} outputs)", self.path.display(), model.inputs.len(), model.outputs.len())
        }
    }
}
