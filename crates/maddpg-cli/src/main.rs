//! MADDPG CLI
//!
//! Command-line interface for training agent populations on a particle task.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use maddpg::prelude::*;
use maddpg::utils::{format_duration, set_seed};

mod env;

use env::{Spread, NUM_MOVES};

#[derive(Parser)]
#[command(name = "maddpg")]
#[command(version, about = "MADDPG - multi-agent actor-critic training in Rust", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a population on the particle task
    Train(TrainArgs),

    /// List the available training variants
    Variants,

    /// Demo: run the particle task with random actions
    Demo {
        /// Number of agents
        #[arg(long, default_value = "3")]
        agents: usize,

        /// Number of steps
        #[arg(long, default_value = "25")]
        steps: usize,
    },
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Training variant (ddpg, maddpg, m3ddpg, rmaddpg)
    #[arg(long, default_value = "maddpg", value_parser = parse_variant)]
    variant: PolicyVariant,

    /// Number of agents
    #[arg(long, default_value = "3")]
    agents: usize,

    /// Number of adversaries, taking the lowest indices
    #[arg(long, default_value = "0")]
    adversaries: usize,

    /// Total environment steps
    #[arg(long, default_value = "5000")]
    steps: u64,

    /// Steps per episode
    #[arg(long, default_value = "25")]
    episode_len: u32,

    /// Environment steps between population updates
    #[arg(long, default_value = "100")]
    update_every: u64,

    /// Mini-batch size
    #[arg(long, default_value = "256")]
    batch_size: usize,

    /// Transition store capacity per agent
    #[arg(long, default_value = "100000")]
    memory_size: usize,

    /// Policy learning rate
    #[arg(long, default_value = "0.01")]
    lr_actor: f64,

    /// Value model learning rate
    #[arg(long, default_value = "0.01")]
    lr_critic: f64,

    /// Hidden layer width
    #[arg(long, default_value = "64")]
    hidden: i64,

    /// Train opponent models of every peer
    #[arg(long)]
    model_opponents: bool,

    /// Std of Gaussian noise on peers' observations
    #[arg(long)]
    sigma_noise: Option<f64>,

    /// Temperature used to resample peers' actions
    #[arg(long)]
    temp_noise: Option<f64>,

    /// Random seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Directory receiving one state file per agent after training
    #[arg(long)]
    save_dir: Option<PathBuf>,
}

fn parse_variant(s: &str) -> std::result::Result<PolicyVariant, String> {
    s.parse().map_err(|e: MaddpgError| e.to_string())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => train(&args)?,
        Commands::Variants => list_variants(),
        Commands::Demo { agents, steps } => demo(agents, steps)?,
    }

    Ok(())
}

type Agent = MaddpgAgent<MlpActor, MlpCritic>;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}";

fn build_population(args: &TrainArgs, obs_size: i64) -> Result<Vec<Agent>> {
    let device = if tch::Cuda::is_available() {
        tracing::info!("Using CUDA");
        tch::Device::Cuda(0)
    } else {
        tracing::info!("Using CPU");
        tch::Device::Cpu
    };

    let mut config = AgentConfig::default()
        .with_device(device)
        .with_variant(args.variant)
        .with_lr(args.lr_actor, args.lr_critic)
        .with_batch_size(args.batch_size)
        .with_memory_size(args.memory_size)
        .with_noise(args.sigma_noise, args.temp_noise)
        .with_seed(args.seed);
    if args.model_opponents {
        config = config.with_modeling(ModelingConfig {
            batch_size: args.batch_size,
            ..ModelingConfig::default()
        });
    }

    let mlp = MlpConfig {
        hidden_size: args.hidden,
        ..MlpConfig::default()
    };
    let n = args.agents;
    let moves = NUM_MOVES as i64;
    let joint_critic = || MlpCritic::new(&vec![obs_size; n], &vec![moves; n], mlp.clone(), device);

    (0..n)
        .map(|i| {
            let actor = MlpActor::discrete(obs_size, &[moves], mlp.clone(), device);
            let critic = if args.variant.is_centralized() {
                joint_critic()
            } else {
                MlpCritic::new(&[obs_size], &[moves], mlp.clone(), device)
            };
            let nature = args.variant.is_robust().then(joint_critic);
            let name = if i < args.adversaries {
                format!("adversary_{}", i)
            } else {
                format!("agent_{}", i)
            };
            tracing::info!(
                agent = %name,
                params = actor.num_parameters(),
                "Created actor"
            );
            Ok(MaddpgAgent::new(
                i,
                name,
                n,
                args.adversaries,
                actor,
                critic,
                nature,
                config.clone(),
            )?)
        })
        .collect()
}

fn train(args: &TrainArgs) -> Result<()> {
    if args.agents < 2 {
        bail!("training needs at least two agents");
    }
    if args.adversaries >= args.agents {
        bail!("at least one agent must not be an adversary");
    }
    if args.update_every == 0 {
        bail!("--update-every must be positive");
    }

    tracing::info!(
        variant = %args.variant,
        agents = args.agents,
        adversaries = args.adversaries,
        steps = args.steps,
        "Starting training"
    );
    set_seed(args.seed);

    let mut env = Spread::new(args.agents, args.adversaries, args.episode_len, args.seed);
    let agents = build_population(args, env.obs_size() as i64)?;
    let mut population = Population::new(agents)?.with_logger(Box::new(ConsoleLogger::new()));

    let pb = ProgressBar::new(args.steps);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut obs = env.reset();
    let mut episode = 0i64;
    let mut episode_reward = 0.0f32;
    let mut finished: Vec<f32> = Vec::new();

    for step in 1..=args.steps {
        let actions = population.act_all(&obs, true)?;
        let (next_obs, rewards, done) = env.step(&actions);
        let dones = vec![done; env.num_agents()];
        population.experience_all(episode, &obs, &actions, &rewards, &next_obs, &dones)?;
        episode_reward += rewards.last().copied().unwrap_or_default();

        obs = if done {
            finished.push(episode_reward);
            episode_reward = 0.0;
            episode += 1;
            env.reset()
        } else {
            next_obs
        };

        let ready = step as usize >= args.batch_size;
        if ready && step % args.update_every == 0 {
            let reports = population.update_all()?;
            if let Some(report) = reports.iter().find(|r| !r.is_finite()) {
                bail!("update produced non-finite losses: {:?}", report);
            }
        }

        pb.set_position(step);
        if let (true, Some(last)) = (done, finished.last()) {
            pb.set_message(format!("episode {} reward {:.3}", episode, last));
        }
    }
    pb.finish_with_message("Training complete");

    let recent = &finished[finished.len().saturating_sub(10)..];
    let mean_reward = if recent.is_empty() {
        f32::NAN
    } else {
        recent.iter().sum::<f32>() / recent.len() as f32
    };
    tracing::info!(
        episodes = episode,
        updates = population.updates(),
        mean_reward,
        elapsed = %format_duration(start.elapsed().as_secs_f64()),
        "Training complete"
    );

    if let Some(dir) = &args.save_dir {
        save_population(&population, dir)?;
    }
    Ok(())
}

fn save_population(population: &Population<MlpActor, MlpCritic>, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating {}", dir.display()))?;
    for agent in population.agents() {
        let path = dir.join(format!("{}.json", agent.name()));
        std::fs::write(&path, agent.save_state()?)
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "Saved agent state");
    }
    Ok(())
}

fn demo(agents: usize, steps: usize) -> Result<()> {
    if agents == 0 {
        bail!("demo needs at least one agent");
    }
    tracing::info!(agents, steps, "Running demo");

    let mut env = Spread::new(agents, 0, steps as u32, 0);
    env.reset();
    for step in 0..steps {
        let actions = env.random_actions();
        let (_, rewards, done) = env.step(&actions);
        println!("Step {}: reward={:.3}", step, rewards[0]);
        if done {
            break;
        }
    }
    Ok(())
}

fn list_variants() {
    println!("Available variants:");
    println!();
    println!("  ddpg       Independent learners, critic sees only the agent itself");
    println!("  maddpg     Centralized critic over every agent's observation and action");
    println!("  m3ddpg     Centralized critic scored against worst-case peer actions");
    println!("  rmaddpg    Centralized critic bootstrapped on a learned nature reward");
    println!();
    println!("Any centralized variant accepts --model-opponents.");
}
