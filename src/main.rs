use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::prelude::*;

use roster_finder::*;

/// Finds premade team rosters in match records and reports how they perform.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON document with match_players, matches and players, or a directory of CSV files
    #[arg(long)]
    input: PathBuf,
    /// Where to write the roster report as JSON
    #[arg(long)]
    output: Option<PathBuf>,
    /// Where to write every community that passed the co-occurrence filter
    #[arg(long)]
    communities_output: Option<PathBuf>,
    /// JSON file with analysis settings; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Min parties together for a connection
    #[arg(long)]
    min_matches: Option<u32>,
    /// Min matches played as a unit for a roster to be reported
    #[arg(long)]
    min_team_matches: Option<usize>,
    #[arg(long)]
    min_roster_size: Option<usize>,
    #[arg(long)]
    max_roster_size: Option<usize>,
    /// Min games as teammates for a link between two community members
    #[arg(long)]
    min_cooccurrence_games: Option<u32>,
    /// Share of the community each member needs links with
    #[arg(long)]
    min_cooccurrence_percentage: Option<f64>,
    #[arg(long, value_enum)]
    filter_mode: Option<FilterMode>,
    /// Seed for community detection, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    fn context(&self) -> Result<AnalysisContext> {
        let mut ctx = match &self.config {
            Some(path) => AnalysisContext::from_json_file(path)?,
            None => AnalysisContext::default(),
        };

        if let Some(v) = self.min_matches {
            ctx.min_matches_for_connection = v;
        }
        if let Some(v) = self.min_team_matches {
            ctx.min_team_matches = v;
        }
        if let Some(v) = self.min_roster_size {
            ctx.min_roster_size = v;
        }
        if let Some(v) = self.max_roster_size {
            ctx.max_roster_size = v;
        }
        if let Some(v) = self.min_cooccurrence_games {
            ctx.min_cooccurrence_games = v;
        }
        if let Some(v) = self.min_cooccurrence_percentage {
            ctx.min_cooccurrence_percentage = v;
        }
        if let Some(v) = self.filter_mode {
            ctx.filter_mode = v;
        }
        if let Some(v) = self.seed {
            ctx.detector_seed = Some(v);
        }

        ctx.validate()?;
        Ok(ctx)
    }
}

fn run(args: &Args) -> Result<()> {
    let ctx = args.context()?;
    tracing::info!(?ctx, "Starting team analysis");

    let raw = load_relations(&args.input)?;
    let dataset = prepare_relations(raw);

    let outcome = analyze(&dataset, &ctx, &Louvain::from_context(&ctx));

    output_report(&outcome.rosters);

    if let Some(path) = &args.output {
        write_json(path, &outcome.rosters)?;
        tracing::info!(rosters = outcome.rosters.len(), path = %path.display(), "Saved team rosters");
    }
    if let Some(path) = &args.communities_output {
        write_json(path, &outcome.communities)?;
        tracing::info!(communities = outcome.communities.len(), path = %path.display(), "Saved communities");
    }

    Ok(())
}

fn main() -> ExitCode {
    let registry = tracing_subscriber::Registry::default()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        );
    if let Err(e) = tracing::subscriber::set_global_default(registry) {
        eprintln!("could not install logger: {e}");
    }

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Team analysis failed: {e}");
            ExitCode::FAILURE
        }
    }
}
