use std::io::IsTerminal;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kira_gene_annotations::app::App;
use kira_gene_annotations::biomart::BiomartHttpClient;
use kira_gene_annotations::config::ConfigLoader;
use kira_gene_annotations::domain::SpeciesKey;
use kira_gene_annotations::output::{
    ConsoleOutput, JsonOutput, OutputMode, print_fetch_summary, print_species_list,
};
use kira_gene_annotations::store::Store;
use kira_gene_annotations::tui::Tui;

#[derive(Parser)]
#[command(name = "kira-ga")]
#[command(about = "Download Ensembl BioMart gene annotations for a species into data/<Species>/")]
#[command(version, author)]
struct Cli {
    /// Species key, e.g. homo-sapiens or mus-musculus
    #[arg(required_unless_present = "list_species")]
    species: Option<String>,

    /// Print the supported species and exit
    #[arg(long)]
    list_species: bool,

    /// Path to a JSON config file (defaults to ./kira-ga.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Root directory for species folders (overrides config)
    #[arg(long)]
    output_dir: Option<Utf8PathBuf>,

    #[arg(long)]
    non_interactive: bool,

    /// Print the fetch result as JSON on stdout
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.list_species {
        print_species_list();
        return Ok(());
    }

    let Some(species) = cli.species.as_deref() else {
        return Err(miette::Report::msg("species argument required"));
    };
    let species = species.parse::<SpeciesKey>()?;

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(output_dir) = cli.output_dir {
        config.output_root = output_dir;
    }

    let output_mode = if cli.json {
        OutputMode::Json
    } else if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let client = BiomartHttpClient::new(config.request_timeout)?;
    let store = Store::new(config.output_root.clone());
    let app = App::new(store, client, config);

    match output_mode {
        OutputMode::Json => {
            let result = app.fetch(&species, &JsonOutput)?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
        }
        OutputMode::NonInteractive => {
            let result = app.fetch(&species, &ConsoleOutput)?;
            print_fetch_summary(&result);
        }
        OutputMode::Interactive => {
            let mut tui = Tui::new(species);
            let result = tui.run(move |sink| app.fetch(&species, sink))?;
            print_fetch_summary(&result);
        }
    }
    Ok(())
}
