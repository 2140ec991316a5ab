//! TorchScript hand landmark model.
//!
//! Expected module contract: input `[1, 3, H, W]` RGB float in `[0, 1]`;
//! output a tuple `(landmarks, scores)` with `landmarks` shaped `[N, 21, C]`
//! (`C >= 2`, normalized x/y first) and `scores` shaped `[N]`.

use std::{convert::TryFrom, path::Path};

use anyhow::{Result, anyhow, bail};
use tch::{self, Device, IValue, Kind, Tensor};
use tracing::trace;

use crate::{
    landmarks::{HAND_LANDMARK_COUNT, HandObservation},
    tracker::{FrameView, HandTracker, TrackerError},
};

/// TorchScript-backed [`HandTracker`].
pub struct HandLandmarkModel {
    module: tch::CModule,
    device: Device,
    input_size: (i64, i64),
    min_confidence: f32,
    max_hands: usize,
}

impl HandLandmarkModel {
    /// Load a TorchScript module onto `device`; `input_size` is (width, height).
    pub fn new<P: AsRef<Path>>(model_path: P, device: Device, input_size: (i64, i64)) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            min_confidence: 0.7,
            max_hands: 1,
        })
    }

    pub fn with_min_confidence(mut self, confidence: f32) -> Self {
        self.min_confidence = confidence;
        self
    }

    pub fn with_max_hands(mut self, max_hands: usize) -> Self {
        self.max_hands = max_hands.max(1);
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Convert a BGR8 frame into a resized RGB tensor on the model device.
    pub fn bgr_to_tensor(&self, bgr: &[u8], width: i32, height: i32) -> Result<Tensor> {
        let expected = (width as usize) * (height as usize) * 3;
        if bgr.len() != expected {
            bail!(
                "unexpected frame buffer size: got {} bytes, expected {}",
                bgr.len(),
                expected
            );
        }

        let (in_w, in_h) = self.input_size;
        let tensor = Tensor::from_slice(bgr)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, height as i64, width as i64, 3])
            .permute([0, 3, 1, 2])
            .flip([1])
            / 255.0;

        if (width as i64, height as i64) == (in_w, in_h) {
            Ok(tensor)
        } else {
            Ok(tensor.upsample_bilinear2d([in_h, in_w], false, None, None))
        }
    }

    fn infer(&self, input: &Tensor, width: i32, height: i32) -> Result<Vec<HandObservation>> {
        let output = tch::no_grad(|| self.module.forward_is(&[IValue::Tensor(input.shallow_clone())]))?;
        let (landmarks, scores) = match output {
            IValue::Tuple(mut items) if items.len() == 2 => {
                let scores = items.pop();
                let landmarks = items.pop();
                match (landmarks, scores) {
                    (Some(IValue::Tensor(l)), Some(IValue::Tensor(s))) => (l, s),
                    _ => bail!("hand model must return (landmarks, scores) tensors"),
                }
            }
            other => bail!("unexpected hand model output: {other:?}"),
        };

        let shape = landmarks.size();
        if shape.len() != 3 || shape[1] != HAND_LANDMARK_COUNT as i64 || shape[2] < 2 {
            bail!("unexpected landmark tensor shape: {shape:?}");
        }
        let hands = shape[0];
        let xy = landmarks
            .to_device(Device::Cpu)
            .to_kind(Kind::Float)
            .narrow(2, 0, 2)
            .contiguous()
            .flatten(0, -1);
        let xy: Vec<f32> = Vec::<f32>::try_from(&xy)?;
        let scores: Vec<f32> = Vec::<f32>::try_from(
            &scores.to_device(Device::Cpu).to_kind(Kind::Float).flatten(0, -1),
        )?;
        if scores.len() as i64 != hands {
            return Err(anyhow!(
                "model returned {} scores for {} hands",
                scores.len(),
                hands
            ));
        }

        let stride = HAND_LANDMARK_COUNT * 2;
        let mut ranked: Vec<(f32, HandObservation)> = Vec::new();
        for (hand_idx, score) in scores.iter().copied().enumerate() {
            if score < self.min_confidence {
                continue;
            }
            let start = hand_idx * stride;
            let Some(points) = xy.get(start..start + stride) else {
                break;
            };
            ranked.push((score, HandObservation::from_normalized(points, width, height)?));
        }
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked.truncate(self.max_hands);
        trace!(hands = ranked.len(), "hand model inference");

        Ok(ranked.into_iter().map(|(_, hand)| hand).collect())
    }
}

impl HandTracker for HandLandmarkModel {
    fn detect(&mut self, frame: FrameView<'_>) -> Result<Vec<HandObservation>, TrackerError> {
        frame.check()?;
        let input = self.bgr_to_tensor(frame.bgr, frame.width, frame.height)?;
        Ok(self.infer(&input, frame.width, frame.height)?)
    }
}
