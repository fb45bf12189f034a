//! Small dense regressor used as the feedback correction model.
//!
//! Fully connected layers with ReLU hidden activations and a linear output,
//! trained full-batch on mean squared error with Adam. Per-sample gradients
//! are computed in parallel with rayon.

use crate::error::{DesignError, DesignResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Lower bound applied to column standard deviations.
pub const MIN_STD: f64 = 1e-8;

/// Per-column mean/std normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl Standardizer {
    pub fn fit(rows: &[Vec<f64>]) -> DesignResult<Self> {
        let Some(first) = rows.first() else {
            return Err(DesignError::Retrain("cannot standardize zero rows".into()));
        };
        let width = first.len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(DesignError::Retrain("ragged rows".into()));
        }

        let n = rows.len() as f64;
        let mut mean = vec![0.0; width];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut std = vec![0.0; width];
        for row in rows {
            for ((s, v), m) in std.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in &mut std {
            *s = s.sqrt().max(MIN_STD);
        }
        Ok(Self { mean, std })
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn inverse(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(v, (m, s))| v * s + m)
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Dense {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs x inputs`
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl Dense {
    fn param_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn forward(&self, x: &[f64], relu: bool) -> Vec<f64> {
        (0..self.outputs)
            .map(|j| {
                let row = &self.weights[j * self.inputs..(j + 1) * self.inputs];
                let z = self.biases[j] + row.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>();
                if relu { z.max(0.0) } else { z }
            })
            .collect()
    }
}

/// Outcome of [`Mlp::fit`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub epochs: usize,
    pub initial_loss: f64,
    pub final_loss: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct FitOptions {
    pub epochs: usize,
    pub learning_rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Dense>,
}

impl Mlp {
    /// `sizes` lists the input width, each hidden width and the output width.
    pub fn new(sizes: &[usize], seed: u64) -> DesignResult<Self> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(DesignError::Retrain(format!("invalid layer sizes {:?}", sizes)));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (inputs, outputs) = (pair[0], pair[1]);
                // He-uniform initialization
                let limit = (6.0 / inputs as f64).sqrt();
                Dense {
                    inputs,
                    outputs,
                    weights: (0..inputs * outputs)
                        .map(|_| rng.gen_range(-limit..limit))
                        .collect(),
                    biases: vec![0.0; outputs],
                }
            })
            .collect();
        Ok(Self { layers })
    }

    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![self.input_width()];
        sizes.extend(self.layers.iter().map(|l| l.outputs));
        sizes
    }

    pub fn param_count(&self) -> usize {
        self.layers.iter().map(Dense::param_count).sum()
    }

    pub fn predict(&self, x: &[f64]) -> DesignResult<Vec<f64>> {
        if x.len() != self.input_width() {
            return Err(DesignError::Prediction(format!(
                "expected {} inputs, got {}",
                self.input_width(),
                x.len()
            )));
        }
        Ok(self.activations(x).pop().unwrap_or_default())
    }

    /// Input followed by each layer's output.
    fn activations(&self, x: &[f64]) -> Vec<Vec<f64>> {
        let last = self.layers.len().saturating_sub(1);
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(x.to_vec());
        for (i, layer) in self.layers.iter().enumerate() {
            let next = layer.forward(&acts[i], i != last);
            acts.push(next);
        }
        acts
    }

    /// Flat gradient of the sample's squared error, plus that error.
    fn sample_gradient(&self, x: &[f64], y: &[f64]) -> (Vec<f64>, f64) {
        let acts = self.activations(x);
        let mut grad = vec![0.0; self.param_count()];
        let output = &acts[acts.len() - 1];
        let width = output.len() as f64;

        let mut delta: Vec<f64> = output
            .iter()
            .zip(y)
            .map(|(o, t)| 2.0 * (o - t) / width)
            .collect();
        let loss = output.iter().zip(y).map(|(o, t)| (o - t).powi(2)).sum::<f64>() / width;

        let mut offset = grad.len();
        for (l, layer) in self.layers.iter().enumerate().rev() {
            offset -= layer.param_count();
            let input = &acts[l];
            let (gw, gb) =
                grad[offset..offset + layer.param_count()].split_at_mut(layer.weights.len());
            for j in 0..layer.outputs {
                for i in 0..layer.inputs {
                    gw[j * layer.inputs + i] = delta[j] * input[i];
                }
                gb[j] = delta[j];
            }
            if l > 0 {
                delta = (0..layer.inputs)
                    .map(|i| {
                        if input[i] <= 0.0 {
                            return 0.0;
                        }
                        (0..layer.outputs)
                            .map(|j| layer.weights[j * layer.inputs + i] * delta[j])
                            .sum()
                    })
                    .collect();
            }
        }
        (grad, loss)
    }

    fn batch_gradient(&self, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> (Vec<f64>, f64) {
        let n = inputs.len() as f64;
        let zero = || (vec![0.0; self.param_count()], 0.0);
        let (mut grad, loss) = inputs
            .par_iter()
            .zip(targets.par_iter())
            .map(|(x, y)| self.sample_gradient(x, y))
            .reduce(zero, |(mut ga, la), (gb, lb)| {
                for (a, b) in ga.iter_mut().zip(&gb) {
                    *a += b;
                }
                (ga, la + lb)
            });
        for g in &mut grad {
            *g /= n;
        }
        (grad, loss / n)
    }

    fn apply(&mut self, step: &[f64]) {
        let mut offset = 0;
        for layer in &mut self.layers {
            for w in layer.weights.iter_mut().chain(layer.biases.iter_mut()) {
                *w -= step[offset];
                offset += 1;
            }
        }
    }

    pub fn mse(&self, inputs: &[Vec<f64>], targets: &[Vec<f64>]) -> f64 {
        self.batch_gradient(inputs, targets).1
    }

    /// Full-batch Adam on mean squared error.
    pub fn fit(
        &mut self,
        inputs: &[Vec<f64>],
        targets: &[Vec<f64>],
        options: FitOptions,
    ) -> DesignResult<FitReport> {
        if inputs.is_empty() || inputs.len() != targets.len() {
            return Err(DesignError::Retrain(format!(
                "need matching non-empty inputs and targets, got {} and {}",
                inputs.len(),
                targets.len()
            )));
        }
        if inputs.iter().any(|x| x.len() != self.input_width())
            || targets.iter().any(|y| y.len() != self.output_width())
        {
            return Err(DesignError::Retrain("sample width does not match network".into()));
        }

        let mut adam = AdamState::new(self.param_count(), options.learning_rate);
        let mut initial_loss = f64::NAN;
        let mut loss = f64::NAN;
        for epoch in 0..options.epochs {
            let (grad, batch_loss) = self.batch_gradient(inputs, targets);
            if !batch_loss.is_finite() {
                return Err(DesignError::Retrain(format!("loss diverged at epoch {}", epoch)));
            }
            if epoch == 0 {
                initial_loss = batch_loss;
            }
            let step = adam.step(&grad);
            self.apply(&step);
            loss = batch_loss;
        }

        let final_loss = self.mse(inputs, targets);
        if !final_loss.is_finite() {
            return Err(DesignError::Retrain("final loss is not finite".into()));
        }
        tracing::debug!(
            epochs = options.epochs,
            initial_loss,
            last_epoch_loss = loss,
            final_loss,
            "regressor fitted"
        );
        Ok(FitReport {
            epochs: options.epochs,
            initial_loss,
            final_loss,
        })
    }
}

struct AdamState {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    first_moments: Vec<f64>,
    second_moments: Vec<f64>,
    t: i32,
}

impl AdamState {
    fn new(params: usize, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            first_moments: vec![0.0; params],
            second_moments: vec![0.0; params],
            t: 0,
        }
    }

    fn step(&mut self, grad: &[f64]) -> Vec<f64> {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        grad.iter()
            .zip(self.first_moments.iter_mut().zip(self.second_moments.iter_mut()))
            .map(|(g, (m, v))| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / bias1;
                let v_hat = *v / bias2;
                self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardizer_floors_constant_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let scaler = Standardizer::fit(&rows).unwrap();
        assert_eq!(scaler.mean, vec![2.0, 5.0]);
        assert_eq!(scaler.std, vec![1.0, MIN_STD]);
        assert_eq!(scaler.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
        assert_eq!(scaler.inverse(&[1.0, 0.0]), vec![3.0, 5.0]);
    }

    #[test]
    fn same_seed_gives_same_network() {
        let a = Mlp::new(&[8, 64, 32, 2], 42).unwrap();
        let b = Mlp::new(&[8, 64, 32, 2], 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.sizes(), vec![8, 64, 32, 2]);
        assert_eq!(a.param_count(), 8 * 64 + 64 + 64 * 32 + 32 + 32 * 2 + 2);
    }

    #[test]
    fn fit_reduces_loss_on_a_linear_map() {
        let inputs: Vec<Vec<f64>> = (0..24)
            .map(|i| {
                let t = i as f64 / 12.0 - 1.0;
                vec![t, -t * 0.5]
            })
            .collect();
        let targets: Vec<Vec<f64>> = inputs.iter().map(|x| vec![2.0 * x[0] + x[1]]).collect();

        let mut net = Mlp::new(&[2, 16, 8, 1], 7).unwrap();
        let report = net
            .fit(&inputs, &targets, FitOptions { epochs: 200, learning_rate: 0.01 })
            .unwrap();
        assert!(report.final_loss < report.initial_loss * 0.1, "{:?}", report);
    }

    #[test]
    fn analytic_gradient_matches_finite_difference() {
        let net = Mlp::new(&[3, 4, 2], 3).unwrap();
        let x = [0.3, -0.2, 0.8];
        let y = [0.5, -1.0];
        let (grad, _) = net.sample_gradient(&x, &y);

        let h = 1e-6;
        for k in [0, 5, grad.len() - 1] {
            let mut plus = net.clone();
            let mut minus = net.clone();
            let mut step = vec![0.0; grad.len()];
            step[k] = -h;
            plus.apply(&step);
            step[k] = h;
            minus.apply(&step);
            let numeric =
                (plus.sample_gradient(&x, &y).1 - minus.sample_gradient(&x, &y).1) / (2.0 * h);
            assert!((numeric - grad[k]).abs() < 1e-5, "param {}: {} vs {}", k, numeric, grad[k]);
        }
    }

    #[test]
    fn mismatched_widths_are_rejected() {
        let mut net = Mlp::new(&[2, 4, 1], 1).unwrap();
        let err = net
            .fit(&[vec![1.0]], &[vec![1.0]], FitOptions { epochs: 1, learning_rate: 0.01 })
            .unwrap_err();
        assert!(matches!(err, DesignError::Retrain(_)));
        assert!(net.predict(&[1.0]).is_err());
    }
}
