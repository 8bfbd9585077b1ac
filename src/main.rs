use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use parody_generator::cli::{Cli, Commands, SegmentInput};
use parody_generator::client::{RemoteClient, DEFAULT_SERVER};
use parody_generator::output::{self, ProgressReporter};
use parody_generator::retention::{sweep_expired, RetentionScheduler};
use parody_generator::server::{self, handlers::{GenerateRequest, StatusResponse}};
use parody_generator::{Config, GenerationPipeline, MediaTools, PipelineError, SegmentValidator};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_tracing(&cli);

    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            server::serve(config).await?;
        }
        Commands::Generate {
            input,
            name,
            output: destination,
            server,
        } => {
            let request = input.load()?;
            let name = name.or(request.name);

            match server {
                Some(server) => {
                    let client = RemoteClient::new(&server)?;
                    tracing::info!("Submitting {} segments to {}", request.segments.len(), client.base_url());

                    let request = GenerateRequest {
                        project_name: name,
                        segments: request.segments,
                    };
                    let artifact = client.generate(&request, destination.as_deref(), !cli.quiet).await?;
                    println!(
                        "Audio saved to: {} ({})",
                        artifact.path.display(),
                        parody_generator::utils::format_file_size(artifact.bytes)
                    );
                }
                None => {
                    // Local runs end with the process, so the pending deletion is
                    // left to the server's startup sweep or `parody sweep`.
                    let retention = Arc::new(RetentionScheduler::start());
                    let pipeline = GenerationPipeline::from_config(&config, retention);
                    let reporter = ProgressReporter::new(cli.quiet);

                    let result = pipeline
                        .run_with_progress(name.as_deref(), &request.segments, &|event| reporter.observe(event))
                        .await;

                    let generated = match result {
                        Ok(generated) => {
                            reporter.finish("Generation complete");
                            generated
                        }
                        Err(PipelineError::Validation(validation)) => {
                            reporter.abandon();
                            eprintln!("{}", output::format_validation(&validation));
                            return Ok(ExitCode::FAILURE);
                        }
                        Err(e) => {
                            reporter.abandon();
                            if let Some(details) = e.details() {
                                tracing::debug!("Failure details: {}", details);
                            }
                            return Err(e.into());
                        }
                    };

                    let saved = match destination {
                        Some(path) => Some(output::save_artifact(&generated, &path).await?),
                        None => None,
                    };
                    output::print_generation(&generated, saved.as_deref(), config.retention.hours);
                }
            }
        }
        Commands::Validate { input } => {
            return validate(&config, &input);
        }
        Commands::Status { server } => {
            let status = match server {
                Some(server) => RemoteClient::new(&server)?.status().await?,
                None => local_status(&config).await,
            };
            output::print_status(&status);
            if !status.is_running() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Sweep { max_age_hours } => {
            let max_age = match max_age_hours {
                Some(hours) => Duration::from_secs(hours * 60 * 60),
                None => config.retention_window(),
            };
            let layout = config.storage.layout();
            for dir in [&layout.output_dir, &layout.scratch_dir] {
                let report = sweep_expired(dir, max_age).await?;
                output::print_sweep(dir, &report);
            }
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => Config::config_path()?,
                };
                println!("Configuration file: {}", path.display());
                println!("Edit it to change settings, or run `parody config --show`.");
                println!("Default server address: {}", DEFAULT_SERVER);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose {
        "parody_generator=debug,tower_http=debug"
    } else if cli.quiet {
        "parody_generator=warn"
    } else {
        "parody_generator=info,tower_http=info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn validate(config: &Config, input: &SegmentInput) -> Result<ExitCode> {
    let request = input.load()?;
    let result = SegmentValidator::new(config.limits).validate(&request.segments);

    println!("{}", output::format_validation(&result));

    Ok(if result.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn local_status(config: &Config) -> StatusResponse {
    let tools = config.media_tools();
    let probe = tools.check_available().await;
    StatusResponse::from_probe(tools.backend_name(), &probe)
}
