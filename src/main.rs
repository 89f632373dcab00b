use std::fs;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use microdiff::config::{self, TrainConfig};
use microdiff::data::{self, Sample};
use microdiff::train::train;
use microdiff::{create_graph, Module, RunError, MLP};

fn load_samples(config: &TrainConfig, rng: &mut StdRng) -> Result<Vec<Sample>, RunError> {
    match &config.data_path {
        Some(path) => Ok(data::load_samples(path)?),
        None => {
            info!("no data path set, generating {} synthetic samples", config.samples);
            Ok(data::synthetic_samples(config.samples, rng))
        }
    }
}

fn run(config: &TrainConfig) -> Result<(), RunError> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    // Creating a model
    let model = MLP::with_rng(2, &config.layer_sizes(), &mut rng);
    println!("{}", model);
    println!("number of parameters: {}", model.parameter_count());

    // Replaying a recorded run needs the exact initial weights
    if let Some(path) = &config.weights_path {
        let weights = data::load_weights(path)?;
        model.load_parameters(&weights)?;
        info!("initial weights loaded from {:?}", path);
    }

    let samples = load_samples(config, &mut rng)?;

    // Training loop
    let (history, last_loss) = train(&model, &samples, config.steps, config.alpha)?;

    if let Some(last) = history.last() {
        println!(
            "final step {} loss {:.6}, accuracy {:.1}%",
            last.step,
            last.loss,
            last.accuracy * 100.0
        );
    }

    if let (Some(path), Some(loss)) = (&config.graph_path, last_loss) {
        let graph = create_graph(&loss)?;
        fs::write(path, graph.to_string()).map_err(|source| RunError::Output {
            path: path.clone(),
            source,
        })?;
        info!("computation graph written to {:?}", path);
    }

    Ok(())
}

fn main() -> Result<(), RunError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = config::from_env()?;
    run(&config)
}
