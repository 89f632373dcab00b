//! Max-margin training loop used by the demo binary.

use log::{info, warn};

use crate::data::Sample;
use crate::engine::Value;
use crate::error::EngineError;
use crate::nn::{Module, MLP};

/// Loss and accuracy of one training step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepStats {
    pub step: usize,
    pub loss: f64,
    pub accuracy: f64,
}

/// Linearly decays from `1.0` at step 0 towards `0.1` at `steps`.
pub fn learning_rate(step: usize, steps: usize) -> f64 {
    1.0 - 0.9 * step as f64 / steps as f64
}

/// SVM max-margin loss plus L2 regularization, and the accuracy of the
/// current predictions.
///
/// Returns the loss node so the caller can backpropagate through it.
pub fn svm_loss(model: &MLP, samples: &[Sample], alpha: f64) -> Result<(Value, f64), EngineError> {
    let scores = samples
        .iter()
        .map(|s| {
            let outputs = model.forward(&s.inputs())?;
            match outputs.as_slice() {
                [score] => Ok(score.clone()),
                _ => Err(EngineError::OutputWidth {
                    expected: 1,
                    actual: outputs.len(),
                }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    let losses = samples
        .iter()
        .zip(&scores)
        .map(|(s, score)| (1.0 + -s.label * score).relu())
        .collect::<Vec<_>>();
    let data_loss = losses.iter().sum::<Value>() * (1.0 / losses.len() as f64);

    let reg_loss = alpha * model.parameters().iter().map(|p| p * p).sum::<Value>();
    let total_loss = data_loss + reg_loss;

    let correct = samples
        .iter()
        .zip(&scores)
        .filter(|(s, score)| (s.label > 0.0) == (score.data() > 0.0))
        .count();
    let accuracy = correct as f64 / samples.len() as f64;

    Ok((total_loss, accuracy))
}

/// Plain gradient descent over every parameter.
pub fn sgd_step<M: Module>(model: &M, learning_rate: f64) {
    for p in model.parameters() {
        p.decrement_data(learning_rate * p.grad());
    }
}

/// Runs `steps` optimization steps and returns the per-step stats together
/// with the loss node of the last step.
pub fn train(
    model: &MLP,
    samples: &[Sample],
    steps: usize,
    alpha: f64,
) -> Result<(Vec<StepStats>, Option<Value>), EngineError> {
    let mut history = Vec::with_capacity(steps);
    let mut last_loss = None;

    for k in 0..steps {
        // forward
        let (total_loss, accuracy) = svm_loss(model, samples, alpha)?;

        // backward
        model.zero_grad();
        total_loss.backward();

        // update
        sgd_step(model, learning_rate(k, steps));

        let loss = total_loss.data();
        if !loss.is_finite() {
            warn!("step {} produced a non-finite loss {}", k, loss);
        }
        info!("step {} loss {:.17}, accuracy {:.1}%", k, loss, accuracy * 100.0);

        history.push(StepStats { step: k, loss, accuracy });
        last_loss = Some(total_loss);
    }

    Ok((history, last_loss))
}
