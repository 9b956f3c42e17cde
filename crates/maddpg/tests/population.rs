mod common;

use common::*;
use maddpg::prelude::*;
use std::sync::Arc;

#[test]
fn test_population_step_and_update() {
    tch::manual_seed(30);
    let config = config(PolicyVariant::Maddpg);
    let history = Arc::new(HistoryLogger::new());
    let mut population = Population::new(build_agents(2, 0, &config))
        .unwrap()
        .with_logger(Box::new(history.clone()));
    assert_eq!(population.len(), 2);

    for step in 0..40 {
        let obs: Vec<Vec<f32>> = (0..2).map(|i| observation(step, i)).collect();
        let actions = population.act_all(&obs, true).unwrap();
        assert!(actions.iter().all(|a| a.len() == ACT as usize));
        let next_obs: Vec<Vec<f32>> = (0..2).map(|i| observation(step + 1, i)).collect();
        population
            .experience_all(0, &obs, &actions, &[1.0, 0.5], &next_obs, &[false, step == 39])
            .unwrap();
    }
    assert!(population.agents().iter().all(|a| a.memory().len() == 40));

    let reports = population.update_all().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(population.updates(), 1);
    population.update_all().unwrap();

    let series = history.series("agent_1/critic_loss");
    assert_eq!(series.len(), 2);
    assert_eq!(series[0], (1, reports[1].critic_loss));
    assert!(history.last("agent_0/actor_loss").is_some());
    assert_eq!(history.last("agent_0/nature_loss"), None);
}

#[test]
fn test_population_rejects_misplaced_agents() {
    let config = config(PolicyVariant::Maddpg);
    let mut agents = build_agents(2, 0, &config);
    agents.swap(0, 1);
    assert!(matches!(
        Population::new(agents),
        Err(MaddpgError::PeerMismatch(_))
    ));

    let empty: Vec<Agent> = Vec::new();
    assert!(matches!(
        Population::new(empty),
        Err(MaddpgError::InvalidConfig(_))
    ));
}

#[test]
fn test_population_checks_step_lengths() {
    let config = config(PolicyVariant::Ddpg);
    let mut population = Population::new(build_agents(3, 1, &config)).unwrap();
    let obs: Vec<Vec<f32>> = (0..2).map(|i| observation(0, i)).collect();
    assert!(matches!(
        population.act_all(&obs, false),
        Err(MaddpgError::PeerMismatch(_))
    ));

    let obs: Vec<Vec<f32>> = (0..3).map(|i| observation(0, i)).collect();
    let actions = population.act_all(&obs, false).unwrap();
    let result = population.experience_all(0, &obs, &actions, &[0.0; 2], &obs, &[false; 3]);
    assert!(matches!(result, Err(MaddpgError::PeerMismatch(_))));
    assert!(population.agents().iter().all(|a| a.memory().is_empty()));
}
