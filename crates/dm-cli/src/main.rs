//! demstat CLI

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use dm_data::{describe, Cohort};
use dm_inference::{
    compute_diagnostics, fit_mode, odds_ratios, quality_summary, sample_nuts_multichain,
    summarize_posterior, LogisticModel, NewtonConfig, NutsConfig, Posterior, Prior,
    QualityGates, SamplerResult,
};
use dm_viz::{DensityArtifact, ForestArtifact, TraceArtifact};

#[derive(Parser)]
#[command(name = "demstat")]
#[command(about = "demstat - Bayesian dementia-cohort analysis")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

/// Sampling options shared by `fit` and `viz`.
#[derive(Args, Debug, Clone)]
struct SampleArgs {
    /// Number of chains (run in parallel).
    #[arg(long, default_value = "4")]
    chains: usize,

    /// Warmup iterations per chain (adaptation, discarded).
    #[arg(long, default_value = "1000")]
    warmup: usize,

    /// Post-warmup draws per chain.
    #[arg(long, default_value = "1000")]
    samples: usize,

    /// Base RNG seed; chain c uses seed + c.
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Target Metropolis acceptance probability.
    #[arg(long, default_value = "0.8")]
    target_accept: f64,

    /// Maximum NUTS tree depth.
    #[arg(long, default_value = "10")]
    max_treedepth: usize,

    /// Use flat (improper) priors instead of the weakly informative
    /// defaults. The posterior mode then equals the MLE.
    #[arg(long)]
    flat_priors: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Descriptive statistics of the cleaned cohort
    Describe {
        /// Input cohort CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Bayesian logistic regression of dementia status (NUTS)
    Fit {
        /// Input cohort CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        sample: SampleArgs,
    },

    /// Emit a plot-friendly JSON artifact from a sampling run
    Viz {
        #[command(subcommand)]
        kind: VizCommands,
    },
}

#[derive(Subcommand)]
enum VizCommands {
    /// Per-chain trace series with divergence markers
    Trace {
        /// Input cohort CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the artifact (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        sample: SampleArgs,
    },

    /// Pooled posterior density histograms
    Density {
        /// Input cohort CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the artifact (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Histogram bins per parameter.
        #[arg(long, default_value = "40")]
        bins: usize,

        #[command(flatten)]
        sample: SampleArgs,
    },

    /// Forest plot of odds ratios with 95% credible intervals
    Forest {
        /// Input cohort CSV
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for the artifact (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Plot raw coefficients (log-odds scale, intercept included,
        /// reference line at 0) instead of odds ratios.
        #[arg(long)]
        log_odds: bool,

        #[command(flatten)]
        sample: SampleArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for the JSON output.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Describe { input, output } => cmd_describe(&input, output.as_ref()),
        Commands::Fit { input, output, sample } => cmd_fit(&input, output.as_ref(), &sample),
        Commands::Viz { kind } => match kind {
            VizCommands::Trace { input, output, sample } => {
                let run = run_sampler(&input, &sample)?;
                let artifact = TraceArtifact::from_result(&run.result)?;
                write_json(output.as_ref(), serde_json::to_value(artifact)?)
            }
            VizCommands::Density { input, output, bins, sample } => {
                let run = run_sampler(&input, &sample)?;
                let artifact = DensityArtifact::from_result(&run.result, bins)?;
                write_json(output.as_ref(), serde_json::to_value(artifact)?)
            }
            VizCommands::Forest { input, output, log_odds, sample } => {
                let run = run_sampler(&input, &sample)?;
                let artifact = if log_odds {
                    let diag = compute_diagnostics(&run.result);
                    let summary = summarize_posterior(&run.result, &diag);
                    ForestArtifact::from_parameter_summaries(&summary)?
                } else {
                    let odds = odds_ratios(&run.result);
                    ForestArtifact::from_odds_ratios(&odds)?
                };
                write_json(output.as_ref(), serde_json::to_value(artifact)?)
            }
        },
    }
}

fn cmd_describe(input: &PathBuf, output: Option<&PathBuf>) -> Result<()> {
    let cohort = Cohort::from_csv_path(input)
        .with_context(|| format!("failed to load cohort from {}", input.display()))?;
    let report = describe(&cohort);
    write_json(output, serde_json::to_value(report)?)
}

/// A completed sampling run plus the artifacts needed for reporting.
struct SamplerRun {
    result: SamplerResult,
    mode_fit: dm_core::types::FitResult,
    n_subjects: usize,
    n_dropped: usize,
}

fn run_sampler(input: &PathBuf, args: &SampleArgs) -> Result<SamplerRun> {
    let cohort = Cohort::from_csv_path(input)
        .with_context(|| format!("failed to load cohort from {}", input.display()))?;
    let n_subjects = cohort.len();
    let n_dropped = cohort.n_dropped;
    let design = cohort.design_matrix().context("failed to assemble design matrix")?;
    let model = LogisticModel::new(design.x, design.y, design.names)
        .context("failed to build logistic model")?;

    let dim = 1 + model.n_predictors();
    let priors = if args.flat_priors {
        Prior::flat(dim)
    } else {
        Prior::weakly_informative(dim)
    };
    let posterior = Posterior::new(&model).with_priors(priors)?;

    // Initialize chains at the posterior mode.
    let mode_fit = fit_mode(&posterior, &NewtonConfig::default())?;
    if !mode_fit.converged {
        tracing::warn!("mode fit did not converge; initializing chains at its last iterate");
    }

    let config = NutsConfig {
        max_treedepth: args.max_treedepth,
        target_accept: args.target_accept,
        init: Some(mode_fit.parameters.clone()),
        ..Default::default()
    };
    let result = sample_nuts_multichain(
        &posterior,
        args.chains,
        args.warmup,
        args.samples,
        args.seed,
        config,
    )?;

    Ok(SamplerRun { result, mode_fit, n_subjects, n_dropped })
}

fn cmd_fit(input: &PathBuf, output: Option<&PathBuf>, args: &SampleArgs) -> Result<()> {
    let run = run_sampler(input, args)?;
    let result = &run.result;

    let diag = compute_diagnostics(result);
    let quality = quality_summary(&diag, args.chains, args.samples, &QualityGates::default());
    for w in &quality.warnings {
        tracing::warn!(gate = %w, "quality gate warning");
    }
    for f in &quality.failures {
        tracing::warn!(gate = %f, "quality gate FAILURE");
    }

    let summary = summarize_posterior(result, &diag);
    let odds = odds_ratios(result);

    let output_json = serde_json::json!({
        "n_subjects": run.n_subjects,
        "n_dropped": run.n_dropped,
        "parameters": summary,
        "odds_ratios": odds,
        "mode_fit": run.mode_fit,
        "sampler": {
            "chains": args.chains,
            "warmup": args.warmup,
            "samples": args.samples,
            "seed": args.seed,
            "divergence_rate": diag.divergence_rate,
            "max_treedepth_rate": diag.max_treedepth_rate,
            "ebfmi": diag.ebfmi,
            "step_sizes": result.chains.iter().map(|c| c.step_size).collect::<Vec<_>>(),
            "mass_diag": result.chains.first().map(|c| c.mass_diag.clone()),
        },
        "quality": {
            "status": quality.status.to_string(),
            "gated": quality.gated,
            "warnings": quality.warnings,
            "failures": quality.failures,
            "max_r_hat": quality.max_r_hat,
            "min_ess_bulk": quality.min_ess_bulk,
            "min_ess_tail": quality.min_ess_tail,
            "min_ebfmi": quality.min_ebfmi,
        },
    });

    write_json(output, output_json)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
        tracing::info!("wrote {}", path.display());
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
