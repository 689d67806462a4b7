use clap::{Parser, Subcommand};
use std::path::PathBuf;
use webpipe::config;
use webpipe::tasks::{self, Task};

#[derive(Parser)]
#[command(name = "webpipe")]
#[command(about = "Front-end asset build pipeline")]
#[command(long_about = "\
Front-end asset build pipeline

Builds src/ into two trees: build-pretty/ (readable) and build-min/
(optimized). NODE_ENV selects the mode; anything other than
\"development\" (the default) is a production build.

Project structure:

  project/
  ├── pipeline.toml          # Optional config (see gen-config)
  └── src/
      ├── images/            # Optimized into */images/
      ├── scss/style.scss    # Compiled into */css/style.css
      ├── js/*.js            # Entries, bundled into */js/bundle.js
      └── html/*.html        # Pages; <partial src=\"...\"> includes

Development: source maps, live reload, dev server on port 8000.
Production:  unused selectors purged, CSS minified.

Run 'webpipe gen-config' to generate a documented pipeline.toml.")]
#[command(version)]
struct Cli {
    /// Project directory
    #[arg(long, default_value = ".", global = true)]
    project: PathBuf,

    /// Config file to use instead of <project>/pipeline.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Remove both output trees
    #[command(alias = "wipe")]
    Clean,
    /// Optimize images that changed since the last build
    Images,
    /// Compile the stylesheet
    Css,
    /// Bundle scripts
    Js,
    /// Minify scripts in the minified tree
    Compressjs,
    /// Build HTML pages
    Html,
    /// Clean, build everything, then watch (and serve in development)
    Default,
    /// Print a stock pipeline.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let task = match cli.command.unwrap_or(Command::Default) {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Clean => Task::Clean,
        Command::Images => Task::Images,
        Command::Css => Task::Css,
        Command::Js => Task::Js,
        Command::Compressjs => Task::CompressJs,
        Command::Html => Task::Html,
        Command::Default => Task::Default,
    };

    let ctx = tasks::prepare(&cli.project, cli.config.as_deref(), None)?;
    init_thread_pool(&ctx.config.processing);
    tasks::run(&ctx, task)?;
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
