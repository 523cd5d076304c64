use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use corpus_sieve::{
    Action, BlurMethod, BlurPolicy, HashPreference, Manifest, NearDuplicateScope,
    RepresentativePolicy, RootReport, RunSummary, Sieve, SieveConfig, manifest_path,
};
use dialoguer::Confirm;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "corpus-sieve",
    version,
    about = "Filter small, blurry and duplicate images out of a labeling corpus"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify every image and quarantine the rejects
    Clean(CleanArgs),

    /// Work with the quarantine manifest
    Manifest {
        #[command(subcommand)]
        command: ManifestCmd,
    },
}

#[derive(Args, Debug)]
struct CleanArgs {
    /// Root folders to clean (`root/<class>/[<source>/]<images>`)
    #[arg(long, value_name = "DIR", num_args = 1.., required = true, env = "CORPUS_SIEVE_ROOTS", value_delimiter = ',')]
    roots: Vec<PathBuf>,

    /// Minimum width in pixels
    #[arg(long, default_value_t = 224, env = "CORPUS_SIEVE_MIN_WIDTH")]
    min_width: u32,

    /// Minimum height in pixels
    #[arg(long, default_value_t = 224, env = "CORPUS_SIEVE_MIN_HEIGHT")]
    min_height: u32,

    /// Blur decision: laplacian | tenengrad | both (blurry only if both fail)
    #[arg(long, default_value = "both", env = "CORPUS_SIEVE_BLUR_METHOD")]
    blur_method: BlurMethod,

    /// Laplacian-variance threshold (lower is blurrier)
    #[arg(long, default_value_t = 60.0, env = "CORPUS_SIEVE_BLUR_THRESHOLD")]
    blur_threshold: f64,

    /// Tenengrad mean(G²) threshold (lower is blurrier)
    #[arg(long, default_value_t = 700.0, env = "CORPUS_SIEVE_TENENGRAD_THRESHOLD")]
    tenengrad_threshold: f64,

    /// Maximum Hamming distance between near-duplicate fingerprints
    #[arg(long, alias = "ham-threshold", default_value_t = 0, env = "CORPUS_SIEVE_HAMMING_THRESHOLD")]
    hamming_threshold: u32,

    /// Duplicate grouping: folder | class | root
    #[arg(long, alias = "near-scope", default_value = "folder", env = "CORPUS_SIEVE_NEAR_DUPLICATE_SCOPE")]
    near_duplicate_scope: NearDuplicateScope,

    /// What to do with rejects: move | delete
    #[arg(long, default_value = "move", env = "CORPUS_SIEVE_ACTION")]
    action: Action,

    /// Fingerprint algorithm: auto | phash | ahash
    #[arg(long, default_value = "auto", env = "CORPUS_SIEVE_HASH_ALGORITHM")]
    hash_algorithm: HashPreference,

    /// Which duplicate to keep: largest-area | path
    #[arg(long, default_value = "largest-area", env = "CORPUS_SIEVE_REPRESENTATIVE")]
    representative: RepresentativePolicy,

    /// Restore blur rejects that pass the current thresholds
    #[arg(long, env = "CORPUS_SIEVE_RESCUE_BLUR")]
    rescue_blur: bool,

    /// Only run the rescue pass (requires --rescue-blur)
    #[arg(long, env = "CORPUS_SIEVE_SKIP_CLEAN")]
    skip_clean: bool,

    /// Only report what would happen
    #[arg(long)]
    dry_run: bool,

    /// Do not ask before deleting
    #[arg(long, short = 'y')]
    yes: bool,

    /// Worker threads (0 = one per core)
    #[arg(long, default_value_t = 0, env = "CORPUS_SIEVE_JOBS")]
    jobs: usize,
}

impl CleanArgs {
    fn into_config(self) -> SieveConfig {
        SieveConfig {
            roots: self.roots,
            min_width: self.min_width,
            min_height: self.min_height,
            blur: BlurPolicy {
                method: self.blur_method,
                laplacian_threshold: self.blur_threshold,
                tenengrad_threshold: self.tenengrad_threshold,
            },
            hamming_threshold: self.hamming_threshold,
            near_duplicate_scope: self.near_duplicate_scope,
            action: self.action,
            hash_algorithm: self.hash_algorithm,
            representative: self.representative,
            rescue_blur: self.rescue_blur,
            skip_clean: self.skip_clean,
            dry_run: self.dry_run,
            jobs: self.jobs,
        }
    }
}

#[derive(Subcommand, Debug)]
enum ManifestCmd {
    /// List quarantine entries of a root
    List {
        /// Root folder
        #[arg(short, long, value_name = "DIR")]
        root: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Clean(args) => {
            let yes = args.yes;
            let config = args.into_config();
            clean(config, yes)?;
        }

        Commands::Manifest { command } => match command {
            ManifestCmd::List { root } => list_manifest(&root)?,
        },
    }

    Ok(())
}

fn clean(config: SieveConfig, yes: bool) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    if config.action == Action::Delete && config.runs_clean() && !config.dry_run && !yes {
        let confirmed = Confirm::new()
            .with_prompt("Permanently delete rejected images? This cannot be undone")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted; no files were changed.");
            return Ok(());
        }
    }

    let sieve = Sieve::new(config)?.with_progress(true);
    if let Some(reason) = sieve.degraded_reason() {
        println!("⚠️  {}; using average hash", reason);
    }

    let mut overall = RunSummary::default();
    for root in sieve.config().roots.clone() {
        println!("▶ Cleaning {} ({})", root.display(), sieve.hash_algorithm());
        let report = sieve
            .run_root(&root)
            .with_context(|| format!("Failed to process {}", root.display()))?;
        print_root(&report, sieve.config());
        overall.merge(&report.summary);
        if report.cancelled {
            println!("⚠️  Cancelled; remaining roots were not visited.");
            break;
        }
    }

    println!("\n✅ Summary (all roots):");
    println!("   {}", overall);
    if sieve.config().runs_clean() {
        println!("   Moved: {} | Deleted: {}", overall.moved, overall.deleted);
    }
    if sieve.config().runs_rescue() {
        println!(
            "   Rescue: scanned {}, restored {}",
            overall.rescue_scanned, overall.rescue_restored
        );
    }
    if !overall.errors.is_empty() {
        println!("   ⚠️  {} file(s) had problems:", overall.errors.len());
        for (path, error) in &overall.errors {
            println!("     {}: {}", path.display(), error);
        }
    }
    if sieve.config().dry_run {
        println!("\n⚠️  Dry-run only; no files were changed.");
    }

    Ok(())
}

fn print_root(report: &RootReport, config: &SieveConfig) {
    if config.runs_clean() {
        println!("\n✨ {}", report.root.display());
        println!("   {}", report.summary);
        for cluster in &report.clusters {
            println!(
                "   🏆 [{}] keeping {} ({} duplicate(s))",
                cluster.scope_key,
                cluster.representative.display(),
                cluster.members.len() - 1
            );
        }
        for record in &report.records {
            if let Some(error) = &record.error {
                println!("   ⚠️  {}: {}", record.path.display(), error);
            }
        }
        if config.dry_run {
            for record in report.records.iter().filter(|r| r.disposition.is_reject()) {
                println!(
                    "   📦 [dry-run] {} {}",
                    record.disposition,
                    record.path.display()
                );
            }
        }
    }

    if let Some(rescue) = &report.rescue {
        for (from, to) in &rescue.restored {
            let verb = if config.dry_run { "[dry-run] RESTORE" } else { "Restored" };
            println!("   🔄 {} {} → {}", verb, from.display(), to.display());
        }
        println!(
            "   Rescue from trash: scanned {}, restored {}",
            rescue.scanned,
            rescue.restored.len()
        );
    }
}

fn list_manifest(root: &std::path::Path) -> Result<()> {
    let manifest = Manifest::load(root)
        .with_context(|| format!("Could not read manifest {:?}", manifest_path(root)))?;

    if manifest.is_empty() {
        println!("No quarantine entries in {}.", root.display());
        return Ok(());
    }

    println!("🗂️  Quarantine manifest:");
    for (i, entry) in manifest.entries() {
        let trash = entry
            .trash_in(root)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(deleted)".to_string());
        println!(
            "[{}] {} {}\n     scope: {}\n     from: {}\n     to: {}\n",
            i,
            entry.timestamp,
            entry.reason,
            entry.scope_key,
            entry.original_in(root).display(),
            trash
        );
    }

    let rescuable = manifest
        .entries()
        .filter(|(_, e)| e.is_rescuable())
        .count();
    println!("{} moved blur reject(s) eligible for rescue.", rescuable);
    Ok(())
}
