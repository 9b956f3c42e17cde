//! Minimax action perturbation.

use crate::policy::ValueModel;
use crate::Result;
use tch::{Kind, Tensor};

/// Per-target perturbation rates seen from agent `index`.
///
/// Agents `0..num_adversaries` form the adversary side. Targets on the same
/// side as `index` get `adv_eps_s`, targets on the other side get `adv_eps`.
pub fn perturb_rate(
    index: usize,
    num_agents: usize,
    num_adversaries: usize,
    adv_eps: f64,
    adv_eps_s: f64,
) -> Vec<f64> {
    let own_side = index < num_adversaries;
    (0..num_agents)
        .map(|i| {
            if (i < num_adversaries) == own_side {
                adv_eps_s
            } else {
                adv_eps
            }
        })
        .collect()
}

/// Unit-normalize each row of `t`.
fn normalize_rows(t: &Tensor) -> Tensor {
    let norm = t
        .norm_scalaropt_dim(2.0, [-1i64].as_slice(), true)
        .clamp_min(1e-12);
    t / norm
}

/// Push every action except `own` one step along the direction that lowers
/// the value estimate.
///
/// The direction comes from a separate backward pass against detached copies
/// of the actions, so no gradient reaches the value model's parameters. The
/// `own` entry is returned as given, graph included.
pub fn minimax_actions<V: ValueModel>(
    value: &V,
    observations: &[Tensor],
    actions: &[Tensor],
    rates: &[f64],
    own: usize,
) -> Result<Vec<Tensor>> {
    let leaves: Vec<Tensor> = actions
        .iter()
        .map(|a| a.detach().set_requires_grad(true))
        .collect();
    let score = -value.forward(observations, &leaves).mean(Kind::Float);
    let grads = Tensor::f_run_backward(&[&score], &leaves, false, false)?;

    Ok(leaves
        .iter()
        .zip(grads.iter())
        .zip(rates)
        .enumerate()
        .map(|(i, ((leaf, grad), rate))| {
            if i == own {
                actions[i].shallow_clone()
            } else {
                leaf.detach() + normalize_rows(grad) * *rate
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{HasVarStore, MlpConfig, MlpCritic};
    use tch::Device;

    #[test]
    fn test_rates_one_adversary() {
        let (eps, eps_s) = (1e-2, 1e-4);
        assert_eq!(perturb_rate(0, 3, 1, eps, eps_s), vec![eps_s, eps, eps]);
        assert_eq!(perturb_rate(1, 3, 1, eps, eps_s), vec![eps, eps_s, eps_s]);
        assert_eq!(perturb_rate(2, 3, 1, eps, eps_s), vec![eps, eps_s, eps_s]);
    }

    #[test]
    fn test_rates_mirror_when_sides_swap() {
        // Two adversaries out of four vs the complementary labeling.
        let (eps, eps_s) = (0.5, 0.1);
        for index in 0..4 {
            let rates = perturb_rate(index, 4, 2, eps, eps_s);
            let mirrored = perturb_rate((index + 2) % 4, 4, 2, eps, eps_s);
            let rotated: Vec<f64> = (0..4).map(|i| mirrored[(i + 2) % 4]).collect();
            assert_eq!(rates, rotated);
        }
    }

    #[test]
    fn test_no_adversaries() {
        assert_eq!(perturb_rate(1, 2, 0, 0.3, 0.2), vec![0.2, 0.2]);
    }

    #[test]
    fn test_minimax_leaves_own_action_and_scales_peers() {
        tch::manual_seed(3);
        let opts = (Kind::Float, Device::Cpu);
        let critic = MlpCritic::new(&[2, 2], &[3, 3], MlpConfig::default(), Device::Cpu);
        let obs = [Tensor::randn([5, 2], opts), Tensor::randn([5, 2], opts)];
        let own = Tensor::randn([5, 3], opts).set_requires_grad(true);
        let peer = Tensor::randn([5, 3], opts);
        let actions = [own.shallow_clone(), peer.shallow_clone()];

        let out = minimax_actions(&critic, &obs, &actions, &[0.0, 0.25], 0).unwrap();
        assert!(out[0].equal(&own));
        assert!(out[0].requires_grad());

        let shift = (&out[1] - &peer).norm_scalaropt_dim(2.0, [-1i64].as_slice(), false);
        for row in 0..5 {
            assert!((shift.double_value(&[row]) - 0.25).abs() < 1e-4);
        }

        for (_, var) in critic.var_store().variables() {
            assert!(!var.grad().defined());
        }
    }
}
