use std::path::PathBuf;

/// Areal redistribution CLI (argument schema only)
#[derive(clap::Parser, Debug)]
#[command(name = "crosswalk", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Run configuration (JSON); absent keys take their defaults
    #[arg(short, long, global = true, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Assign every finer unit to the coarser unit it overlaps most (forbids stdout)
    Map(MapArgs),

    /// Split coarse-unit data onto fine units by population weight (forbids stdout)
    Disaggregate(DisaggregateArgs),

    /// Sum fine-unit data into the coarse units they are assigned to (forbids stdout)
    Aggregate(AggregateArgs),

    /// Compare per-field totals of two tables
    Verify(VerifyArgs),
}

#[derive(clap::Args, Debug)]
pub struct MapArgs {
    /// Coarser polygon layer (.shp, .geojson)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub coarser: PathBuf,

    /// Finer polygon layer (.shp, .geojson)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub finer: PathBuf,

    /// Output assignment file, defaults to "./assignment.json"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Containment map cache; reused while newer than both layers
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub containment: Option<PathBuf>,

    /// Property holding coarser unit ids (row index if omitted)
    #[arg(long)]
    pub coarse_key: Option<String>,

    /// Property holding finer unit ids (row index if omitted)
    #[arg(long)]
    pub fine_key: Option<String>,

    /// Assign unmatched finer units to the coarser unit named by this many leading id characters
    #[arg(long)]
    pub unmatched_prefix: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct RenameArgs {
    /// Field rename rules (JSON list of {state, year, dataset, raw, canonical})
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub renames: Option<PathBuf>,

    /// State the rename rules are narrowed to
    #[arg(long, requires = "renames")]
    pub state: Option<String>,

    /// Year the rename rules are narrowed to
    #[arg(long, requires = "renames")]
    pub year: Option<u32>,
}

#[derive(clap::Args, Debug)]
pub struct DisaggregateArgs {
    /// Coarse attribute table (.shp, .geojson, .json)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub coarse: PathBuf,

    /// Assignment produced by `map`
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub assignment: PathBuf,

    /// Fine-unit population weights (.json, .csv)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub weights: PathBuf,

    /// Output fine-unit table, defaults to "./disaggregated.geojson"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Property holding coarse unit ids (row index if omitted)
    #[arg(long)]
    pub coarse_key: Option<String>,

    /// Id column of a CSV weights file
    #[arg(long, default_value = "GEOID")]
    pub weight_id: String,

    /// Property the fine unit id is written under
    #[arg(long, default_value = "GEOID")]
    pub id_property: String,

    /// Compare column totals of the input and output afterwards
    #[arg(long)]
    pub verify: bool,

    #[command(flatten)]
    pub renames: RenameArgs,
}

#[derive(clap::Args, Debug)]
pub struct AggregateArgs {
    /// Fine attribute table (.shp, .geojson, .json)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub fine: PathBuf,

    /// Assignment produced by `map`
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub assignment: PathBuf,

    /// Output coarse-unit table, defaults to "./aggregated.geojson"
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Property holding fine unit ids (row index if omitted)
    #[arg(long)]
    pub fine_key: Option<String>,

    /// Property the coarse unit id is written under
    #[arg(long, default_value = "GEOID")]
    pub id_property: String,

    #[command(flatten)]
    pub renames: RenameArgs,
}

#[derive(clap::Args, Debug)]
pub struct VerifyArgs {
    /// Original table
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub original: PathBuf,

    /// Redistributed table
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub redistributed: PathBuf,

    /// Property holding unit ids in the original table (row index if omitted)
    #[arg(long)]
    pub original_key: Option<String>,

    /// Property holding unit ids in the redistributed table (row index if omitted)
    #[arg(long)]
    pub redistributed_key: Option<String>,

    #[command(flatten)]
    pub renames: RenameArgs,
}
