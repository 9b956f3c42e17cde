//! Probability distributions for policies and opponent models.

use tch::{Kind, Tensor};

/// Clamp bound keeping uniform noise away from 0 and 1.
const PROB_EPS: f64 = 1.2e-7;
/// Floor applied to relaxed samples before taking their log.
const SAMPLE_FLOOR: f64 = 1e-20;

/// Enum for different types of probability distributions
pub enum Distribution {
    /// Concrete / Gumbel-softmax relaxation of a categorical distribution.
    ///
    /// Samples live on the simplex. Entropy and KL are those of the
    /// underlying categorical.
    RelaxedCategorical { logits: Tensor, temperature: f64 },
    /// Diagonal Gaussian
    Gaussian { mean: Tensor, std: Tensor },
}

impl Distribution {
    /// Relaxed categorical parameterized by (unnormalized) probabilities.
    pub fn relaxed_from_probs(probs: &Tensor, temperature: f64) -> Self {
        Distribution::RelaxedCategorical {
            logits: probs.log(),
            temperature,
        }
    }

    /// Reparameterized sample, differentiable with respect to the parameters.
    pub fn rsample(&self) -> Tensor {
        match self {
            Distribution::RelaxedCategorical {
                logits,
                temperature,
            } => {
                let uniform = Tensor::rand_like(logits).clamp(PROB_EPS, 1.0 - PROB_EPS);
                let gumbel = -(-uniform.log()).log();
                ((normalize_logits(logits) + gumbel) / *temperature).softmax(-1, Kind::Float)
            }
            Distribution::Gaussian { mean, std } => {
                let noise = Tensor::randn_like(mean);
                mean + noise * std
            }
        }
    }

    /// Most likely action: one-hot argmax or the Gaussian mean.
    pub fn mode(&self) -> Tensor {
        match self {
            Distribution::RelaxedCategorical { logits, .. } => {
                let num_events = *logits.size().last().unwrap_or(&1);
                logits
                    .argmax(-1, false)
                    .one_hot(num_events)
                    .to_kind(Kind::Float)
            }
            Distribution::Gaussian { mean, .. } => mean.shallow_clone(),
        }
    }

    /// Log density of `value`, shape `[batch]`.
    pub fn log_prob(&self, value: &Tensor) -> Tensor {
        match self {
            Distribution::RelaxedCategorical {
                logits,
                temperature,
            } => {
                let num_events = *logits.size().last().unwrap_or(&1);
                let log_scale =
                    ln_gamma_int(num_events) + (num_events - 1) as f64 * temperature.ln();
                let log_value = value.clamp_min(SAMPLE_FLOOR).log();
                let score = normalize_logits(logits) - &log_value * *temperature;
                let score = (&score - score.logsumexp([-1i64].as_slice(), true)).sum_dim_intlist(
                    [-1i64].as_slice(),
                    false,
                    Kind::Float,
                );
                score + log_scale
                    - log_value.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            }
            Distribution::Gaussian { mean, std } => {
                let var = std.pow_tensor_scalar(2.0);
                let log_std = std.log();
                let log_2pi = (2.0 * std::f64::consts::PI).ln();
                let sq_diff = (value - mean).pow_tensor_scalar(2.0);
                let element_wise = (sq_diff / (var + 1e-8) + log_std * 2.0 + log_2pi) * -0.5;
                element_wise.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            }
        }
    }

    /// Compute entropy of the distribution, shape `[batch]`.
    pub fn entropy(&self) -> Tensor {
        match self {
            Distribution::RelaxedCategorical { logits, .. } => {
                let probs = logits.softmax(-1, Kind::Float);
                let log_probs = logits.log_softmax(-1, Kind::Float);
                -(probs * log_probs).sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            }
            Distribution::Gaussian { std, .. } => {
                let entropy = std.log() + 0.5 + 0.5 * (2.0 * std::f64::consts::PI).ln();
                entropy.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float)
            }
        }
    }

    /// `KL(self || other)` per sample, shape `[batch]`.
    ///
    /// Both distributions must be of the same family and event size.
    pub fn kl_divergence(&self, other: &Distribution) -> Option<Tensor> {
        match (self, other) {
            (
                Distribution::RelaxedCategorical { logits: p, .. },
                Distribution::RelaxedCategorical { logits: q, .. },
            ) => {
                let log_p = p.log_softmax(-1, Kind::Float);
                let log_q = q.log_softmax(-1, Kind::Float);
                let kl = log_p.exp() * (&log_p - log_q);
                Some(kl.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float))
            }
            (
                Distribution::Gaussian {
                    mean: mean_p,
                    std: std_p,
                },
                Distribution::Gaussian {
                    mean: mean_q,
                    std: std_q,
                },
            ) => {
                let var_p = std_p.pow_tensor_scalar(2.0);
                let var_q = std_q.pow_tensor_scalar(2.0);
                let kl = (std_q / std_p).log() + (var_p + (mean_p - mean_q).pow_tensor_scalar(2.0))
                    / (var_q * 2.0)
                    - 0.5;
                Some(kl.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float))
            }
            _ => None,
        }
    }
}

fn normalize_logits(logits: &Tensor) -> Tensor {
    logits - logits.logsumexp([-1i64].as_slice(), true)
}

/// `ln Γ(n)` for a positive integer `n`.
fn ln_gamma_int(n: i64) -> f64 {
    (2..n).map(|i| (i as f64).ln()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind, Tensor};

    #[test]
    fn test_relaxed_sample_on_simplex() {
        let logits = Tensor::from_slice(&[1.0f32, 2.0, 10.0, 0.0, 0.0, 0.0]).reshape([2, 3]);
        let dist = Distribution::RelaxedCategorical {
            logits,
            temperature: 1.0,
        };
        let sample = dist.rsample();
        assert_eq!(sample.size(), [2, 3]);
        let sums = sample.sum_dim_intlist([-1i64].as_slice(), false, Kind::Float);
        for i in 0..2 {
            assert!((sums.double_value(&[i]) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_relaxed_mode_is_one_hot() {
        let logits = Tensor::from_slice(&[0.1f32, 3.0, -1.0]).reshape([1, 3]);
        let dist = Distribution::RelaxedCategorical {
            logits,
            temperature: 1.0,
        };
        let mode = dist.mode();
        assert_eq!(mode.double_value(&[0, 1]), 1.0);
        assert_eq!(mode.double_value(&[0, 0]), 0.0);
    }

    #[test]
    fn test_relaxed_log_prob_two_events() {
        // Two events, unit temperature, uniform logits: density is 1 on the simplex.
        let logits = Tensor::zeros([1, 2], (Kind::Float, Device::Cpu));
        let dist = Distribution::RelaxedCategorical {
            logits,
            temperature: 1.0,
        };
        let value = Tensor::from_slice(&[0.3f32, 0.7]).reshape([1, 2]);
        let log_prob = dist.log_prob(&value).double_value(&[0]);
        assert!(log_prob.abs() < 1e-4, "log_prob = {}", log_prob);
    }

    #[test]
    fn test_categorical_entropy_and_kl() {
        let logits = Tensor::zeros([1, 4], (Kind::Float, Device::Cpu));
        let uniform = Distribution::RelaxedCategorical {
            logits: logits.shallow_clone(),
            temperature: 1.0,
        };
        let entropy = uniform.entropy().double_value(&[0]);
        assert!((entropy - 4f64.ln()).abs() < 1e-5);

        let same = Distribution::RelaxedCategorical {
            logits,
            temperature: 0.5,
        };
        let kl = uniform.kl_divergence(&same).unwrap().double_value(&[0]);
        assert!(kl.abs() < 1e-6);

        let peaked = Distribution::RelaxedCategorical {
            logits: Tensor::from_slice(&[5.0f32, 0.0, 0.0, 0.0]).reshape([1, 4]),
            temperature: 1.0,
        };
        assert!(uniform.kl_divergence(&peaked).unwrap().double_value(&[0]) > 0.0);
    }

    #[test]
    fn test_gaussian_log_prob() {
        let mean = Tensor::zeros([1, 1], (Kind::Float, Device::Cpu));
        let std = Tensor::ones([1, 1], (Kind::Float, Device::Cpu));
        let dist = Distribution::Gaussian { mean, std };
        let x = Tensor::zeros([1, 1], (Kind::Float, Device::Cpu));
        let val = dist.log_prob(&x).double_value(&[0]);
        assert!((val + 0.9189).abs() < 1e-4);
    }

    #[test]
    fn test_gaussian_entropy() {
        let mean = Tensor::zeros([1, 1], (Kind::Float, Device::Cpu));
        let std = Tensor::ones([1, 1], (Kind::Float, Device::Cpu));
        let dist = Distribution::Gaussian { mean, std };
        let val = dist.entropy().double_value(&[0]);
        assert!((val - 1.4189).abs() < 1e-4);
    }

    #[test]
    fn test_mixed_families_have_no_kl() {
        let gaussian = Distribution::Gaussian {
            mean: Tensor::zeros([1, 2], (Kind::Float, Device::Cpu)),
            std: Tensor::ones([1, 2], (Kind::Float, Device::Cpu)),
        };
        let relaxed = Distribution::RelaxedCategorical {
            logits: Tensor::zeros([1, 2], (Kind::Float, Device::Cpu)),
            temperature: 1.0,
        };
        assert!(gaussian.kl_divergence(&relaxed).is_none());
    }
}
