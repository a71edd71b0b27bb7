//! ONNX Runtime 推理后端

use std::path::Path;

use anyhow::{bail, Context, Result};
use ndarray::{Array4, ArrayD};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::models::InferenceEngine;
use crate::utils::letterbox::LetterboxTensor;

pub struct OrtBackend {
    session: Session,
    name: String,
    input_name: String,
    output_name: String,
}

impl OrtBackend {
    /// 加载 ONNX 模型
    pub fn build(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load model {}", model_path.display()))?;

        let input_name = match session.inputs.first() {
            Some(input) => input.name.clone(),
            None => bail!("model {} has no inputs", model_path.display()),
        };
        let output_name = match session.outputs.first() {
            Some(output) => output.name.clone(),
            None => bail!("model {} has no outputs", model_path.display()),
        };
        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        log::info!(
            "model loaded: {} (input '{}', output '{}', {} threads)",
            model_path.display(),
            input_name,
            output_name,
            intra_threads.max(1)
        );

        Ok(Self {
            session,
            name,
            input_name,
            output_name,
        })
    }
}

/// HWC 交错 → NCHW `[1, 3, S, S]`
fn to_nchw(tensor: &LetterboxTensor) -> Result<Array4<f32>> {
    let s = tensor.input_size as usize;
    if tensor.data.len() != 3 * s * s {
        bail!(
            "tensor has {} values, expected {}",
            tensor.data.len(),
            3 * s * s
        );
    }
    Ok(Array4::from_shape_fn((1, 3, s, s), |(_, c, y, x)| {
        tensor.data[(y * s + x) * 3 + c]
    }))
}

impl InferenceEngine for OrtBackend {
    fn run(&mut self, tensor: &LetterboxTensor) -> Result<ArrayD<f32>> {
        let xs = to_nchw(tensor)?;
        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => TensorRef::from_array_view(&xs)?])?;
        let ys = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;
        Ok(ys.to_owned())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn summary(&self) {
        log::info!(
            "ort backend: {} [{} -> {}]",
            self.name,
            self.input_name,
            self.output_name
        );
    }
}
