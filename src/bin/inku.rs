use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use inku::directive::literal_or_string;
use inku::{route_from_hash, Context, EngineConfig, FsSource, Presenter, RenderOutcome, Session};

/// Render a routed view from a directory of templates to stdout.
#[derive(Debug, Parser)]
#[command(name = "inku", version, about)]
struct Cli {
    /// Route to render, as a hash (`#/about`) or a view name (`about`).
    route: Option<String>,

    /// Directory the document paths are resolved against.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind a base context variable; the value is an expression or plain text.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    vars: Vec<String>,

    /// List the stylesheets the view pulled in on stderr.
    #[arg(long)]
    styles: bool,
}

struct StdoutPresenter;

impl Presenter for StdoutPresenter {
    fn present(&self, _view: &str, html: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = out.write_all(html.as_bytes()).and_then(|_| out.flush()) {
            tracing::error!("failed to write output: {}", e);
        }
    }
}

fn base_context(vars: &[String]) -> Result<Context, String> {
    let empty = Context::new();
    vars.iter()
        .map(|var| {
            let (key, raw) = var
                .split_once('=')
                .ok_or_else(|| format!("--set expects KEY=VALUE, got {var:?}"))?;
            Ok((key.trim().to_string(), literal_or_string(raw, &empty)))
        })
        .collect()
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let base = match base_context(&cli.vars) {
        Ok(base) => base,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let view = route_from_hash(cli.route.as_deref().unwrap_or_default(), &config.default_route);
    let session = Session::new(FsSource::new(&cli.root), StdoutPresenter, config).with_base_context(base);

    match session.render_view(&view).await {
        Ok(RenderOutcome::Presented { diagnostics, .. }) => {
            if cli.styles {
                for link in session.styles().links() {
                    eprintln!("stylesheet {} (from {})", link.href, link.owner);
                }
            }
            if !diagnostics.is_empty() {
                eprintln!("{} diagnostic(s) while rendering {view}", diagnostics.len());
            }
            ExitCode::SUCCESS
        }
        Ok(RenderOutcome::Superseded { .. }) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
