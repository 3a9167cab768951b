use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tract_onnx::prelude::*;

use crate::models::LeafClass;
use crate::preprocess::LeafImage;

pub const MSG_NOT_A_LEAF: &str = "Oops! This doesn't look like a potato leaf 🌿 Please upload a clear photo of a potato plant leaf for accurate disease detection.";

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("failed to load model from {path}: {reason}")]
    Load { path: String, reason: String },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model returned {got} scores, expected {expected}")]
    OutputLen { got: usize, expected: usize },
}

/// Opaque image classifier. Implementations are shared read-only across requests.
pub trait Classifier: Send + Sync {
    /// Returns one score per [`LeafClass`], in [`LeafClass::ALL`] order.
    fn classify(&self, image: &LeafImage) -> Result<Vec<f32>, ClassifierError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[batch, height, width, channel]`, the Keras default.
    Nhwc,
    /// `[batch, channel, height, width]`
    Nchw,
}

impl FromStr for InputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(InputLayout::Nhwc),
            "nchw" => Ok(InputLayout::Nchw),
            other => Err(format!("unknown layout '{other}', expected nhwc or nchw")),
        }
    }
}

impl fmt::Display for InputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputLayout::Nhwc => f.write_str("nhwc"),
            InputLayout::Nchw => f.write_str("nchw"),
        }
    }
}

/// Lays out `image` as a batch of one in the model's input order.
/// Values stay raw 0..=255; the exported model rescales internally.
pub fn input_tensor(
    image: &LeafImage,
    side: usize,
    layout: InputLayout,
) -> Result<Tensor, ClassifierError> {
    let pixels = image.pixels();
    if pixels.shape() != [side, side, 3] {
        return Err(ClassifierError::Inference(format!(
            "input shape {:?} does not match model input {side}x{side}x3",
            pixels.shape()
        )));
    }

    let tensor = match layout {
        InputLayout::Nhwc => {
            let data: Vec<f32> = pixels.iter().map(|&v| f32::from(v)).collect();
            tract_ndarray::Array4::from_shape_vec((1, side, side, 3), data)
        }
        InputLayout::Nchw => {
            let data: Vec<f32> = pixels
                .permuted_axes([2, 0, 1])
                .iter()
                .map(|&v| f32::from(v))
                .collect();
            tract_ndarray::Array4::from_shape_vec((1, 3, side, side), data)
        }
    }
    .map_err(|e| ClassifierError::Inference(e.to_string()))?;

    Ok(tensor.into_tensor())
}

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ONNX export of the trained model, run through tract.
pub struct OnnxClassifier {
    plan: OnnxPlan,
    size: usize,
    layout: InputLayout,
}

impl OnnxClassifier {
    pub fn load(path: &Path, size: u32, layout: InputLayout) -> Result<Self, ClassifierError> {
        let side = size as usize;
        let shape = match layout {
            InputLayout::Nhwc => [1, side, side, 3],
            InputLayout::Nchw => [1, 3, side, side],
        };
        let load_err = |e: TractError| ClassifierError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_err)?
            .with_input_fact(0, f32::fact(shape).into())
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        tracing::info!(path = %path.display(), size, %layout, "model loaded");
        Ok(Self {
            plan,
            size: side,
            layout,
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, image: &LeafImage) -> Result<Vec<f32>, ClassifierError> {
        let input = input_tensor(image, self.size, self.layout)?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;

        let first = outputs
            .first()
            .ok_or_else(|| ClassifierError::Inference("model produced no outputs".to_string()))?;
        let scores = first
            .to_array_view::<f32>()
            .map_err(|e| ClassifierError::Inference(e.to_string()))?;
        Ok(scores.iter().copied().collect())
    }
}

/// Top class picked from a model's score vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub class: LeafClass,
    pub confidence: f32,
}

impl Prediction {
    /// Interprets raw scores. The top score is the confidence; only when a
    /// score falls outside [0, 1] are they treated as logits and softmaxed.
    pub fn from_scores(scores: &[f32]) -> Result<Self, ClassifierError> {
        let expected = LeafClass::ALL.len();
        if scores.len() != expected {
            return Err(ClassifierError::OutputLen {
                got: scores.len(),
                expected,
            });
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ClassifierError::Inference(
                "model returned non-finite scores".to_string(),
            ));
        }

        let probabilities = if scores.iter().all(|s| (0.0..=1.0).contains(s)) {
            scores.to_vec()
        } else {
            softmax(scores)
        };

        let (index, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

        let class = LeafClass::from_index(index).ok_or(ClassifierError::OutputLen {
            got: scores.len(),
            expected,
        })?;

        Ok(Self {
            class,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    pub fn meets(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
