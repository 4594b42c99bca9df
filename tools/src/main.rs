//! stashtools CLI - reshape records and import them into stash-box
//!
//! # Commands
//!
//! ```bash
//! stashtools pipe readcsv in.csv mv Title title write out.json   # Run a pipeline
//! stashtools pipe run script.txt                                  # Commands from a script
//! stashtools resolve studio studios.json                          # Fill ids in an extraction map
//! stashtools import out.json                                      # Create scenes on the server
//! stashtools commands                                             # List pipeline commands
//! ```

use clap::{Parser, Subcommand};
use stashtools::config::{DEFAULT_MAX_INCLUDE_DEPTH, END_OF_SCOPE, INCLUDE_DIRECTIVE};
use stashtools::{
    describe_tree, import_file, resolve_map, CommandRegistry, EntityKind, Pipeline,
    PipelineOptions, RecordStore, ScopeMode, StashBoxClient,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "stashtools")]
#[command(about = "Transform scene records and import them into stash-box", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a command pipeline: <command> <arg>... [<command> <arg>...]...
    Pipe {
        /// Close record source scopes with `end` instead of letting them
        /// consume every following command
        #[arg(long)]
        explicit_scopes: bool,

        /// Maximum nesting of `run <script>` includes
        #[arg(long, default_value_t = DEFAULT_MAX_INCLUDE_DEPTH)]
        max_include_depth: usize,

        /// Print the parsed command tree and exit
        #[arg(long)]
        dry_run: bool,

        /// Pipeline commands and their arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        tokens: Vec<String>,
    },

    /// Create scenes on a stash-box server from a pipeline output file
    Import {
        /// JSON file (array of scene records)
        input: PathBuf,
    },

    /// Look up ids for the null entries of an extraction map
    Resolve {
        /// Entity kind: performer, studio or tag
        kind: String,

        /// Extraction map written by `extractmap`
        file: PathBuf,
    },

    /// Show available pipeline commands
    Commands,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Pipe {
            explicit_scopes,
            max_include_depth,
            dry_run,
            tokens,
        } => cmd_pipe(explicit_scopes, max_include_depth, dry_run, tokens),

        Commands::Import { input } => cmd_import(&input),

        Commands::Resolve { kind, file } => cmd_resolve(&kind, &file),

        Commands::Commands => cmd_commands(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_pipe(
    explicit_scopes: bool,
    max_include_depth: usize,
    dry_run: bool,
    tokens: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = PipelineOptions {
        scope_mode: if explicit_scopes {
            ScopeMode::Delimited
        } else {
            ScopeMode::Legacy
        },
        max_include_depth,
    };
    let pipeline = Pipeline::new(options);

    if dry_run {
        let commands = pipeline.parse(tokens)?;
        print!("{}", describe_tree(&commands));
        return Ok(());
    }

    let result = pipeline.run(tokens, &mut RecordStore::new())?;

    eprintln!("\n📊 {}", result.report.summary());
    for failure in result.report.failures.iter().take(5) {
        eprintln!(
            "   - {} record {} ({}): {}",
            failure.source, failure.index, failure.command, failure.message
        );
    }
    if result.report.failures.len() > 5 {
        eprintln!("   ... and {} more", result.report.failures.len() - 5);
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_import(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;

    let summary = runtime.block_on(async {
        let client = StashBoxClient::from_env()?;
        eprintln!("🔗 Server: {}", client.server_url());
        import_file(&client, input).await
    })?;

    eprintln!("\n📊 {}", summary.summary());
    Ok(())
}

fn cmd_resolve(kind: &str, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::parse(kind)
        .ok_or_else(|| format!("Unknown entity kind '{}': use performer, studio or tag", kind))?;
    let runtime = tokio::runtime::Runtime::new()?;

    let summary = runtime.block_on(async {
        let client = StashBoxClient::from_env()?;
        resolve_map(&client, kind, file).await
    })?;

    eprintln!(
        "📊 {} resolved, {} not found, {} already set",
        summary.resolved, summary.unresolved, summary.kept
    );
    eprintln!("💾 Updated {}", file.display());
    Ok(())
}

fn cmd_commands() -> Result<(), Box<dyn std::error::Error>> {
    let registry = CommandRegistry::standard();

    println!("Pipeline commands ({}):\n", registry.len());
    for spec in registry.specs() {
        let scope = if spec.is_scope() {
            "  (runs the following commands per record)"
        } else {
            ""
        };
        println!("  {:<50}{}", spec.usage, scope);
    }

    println!("\nDirectives:\n");
    let include = format!("{} <scriptfile>", INCLUDE_DIRECTIVE);
    println!("  {:<50}splice commands from a script file", include);
    println!("  {:<50}close a record source (--explicit-scopes)", END_OF_SCOPE);
    Ok(())
}
