//! calsync CLI entry point.

use std::process::ExitCode;
#[cfg(feature = "oauth")]
use std::time::Duration;

use clap::Parser;

use calsync_cli::cli::{Cli, Command, ConfigAction, EventAction, SourceAction};
use calsync_cli::commands::{self, Context, events, sources};
use calsync_cli::config::CliConfig;
use calsync_cli::error::CliResult;
use calsync_core::{TracingConfig, TracingOutputFormat, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut tracing = if cli.debug || config.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if cli.log_json {
        tracing = tracing.with_format(TracingOutputFormat::Json);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: CliConfig) -> CliResult<()> {
    let path = cli.config.clone().unwrap_or_else(CliConfig::default_path);

    // Commands that never talk to a provider.
    let command = match cli.command {
        Command::Config { action } => {
            return match action {
                ConfigAction::Dump => commands::config::dump(&config),
                ConfigAction::Validate => commands::config::validate(&config),
                ConfigAction::Path => {
                    commands::config::path(&path);
                    Ok(())
                }
            };
        }
        Command::Sources {
            action: SourceAction::List,
        } => {
            sources::list(&config);
            return Ok(());
        }
        other => other,
    };

    let ctx = Context::new(config, path)?;
    let result = dispatch(&ctx, command).await;
    ctx.shutdown().await;
    result
}

async fn dispatch(ctx: &Context, command: Command) -> CliResult<()> {
    match command {
        #[cfg(feature = "oauth")]
        Command::Auth { action } => match action {
            calsync_cli::cli::AuthAction::Login { source, timeout } => {
                commands::auth::login(ctx, &source, Duration::from_secs(timeout)).await
            }
            calsync_cli::cli::AuthAction::Logout { source } => {
                commands::auth::logout(ctx, &source).await
            }
        },
        Command::Sources { action } => match action {
            SourceAction::List => {
                sources::list(&ctx.config);
                Ok(())
            }
            SourceAction::Add {
                id,
                provider,
                name,
                tenant,
                server_url,
                username,
                password,
                calendars,
            } => sources::add(
                ctx,
                sources::NewSource {
                    id,
                    provider: provider.into(),
                    name,
                    tenant,
                    server_url,
                    username,
                    password,
                    calendars,
                },
            ),
            SourceAction::Remove { id } => sources::remove(ctx, &id).await,
            SourceAction::Enable { id } => sources::set_enabled(ctx, &id, true),
            SourceAction::Disable { id } => sources::set_enabled(ctx, &id, false),
            SourceAction::Check => sources::check(ctx).await,
        },
        Command::Calendars { source } => commands::calendars::list(ctx, &source).await,
        Command::Events { action } => match action {
            EventAction::List {
                source,
                calendars,
                days,
                limit,
                no_expand,
                json,
            } => {
                events::list(
                    ctx,
                    events::ListArgs {
                        source,
                        calendars,
                        days,
                        limit,
                        expand: !no_expand,
                        json,
                    },
                )
                .await
            }
            EventAction::Create {
                source,
                calendar,
                summary,
                start,
                end,
                location,
                description,
            } => {
                events::create(
                    ctx,
                    events::CreateArgs {
                        source,
                        calendar,
                        summary,
                        start,
                        end,
                        location,
                        description,
                    },
                )
                .await
            }
            EventAction::Update {
                source,
                event,
                summary,
                location,
                description,
                force,
            } => {
                events::update(
                    ctx,
                    events::UpdateArgs {
                        source,
                        event,
                        summary,
                        location,
                        description,
                        force,
                    },
                )
                .await
            }
            EventAction::Delete { source, event } => events::delete(ctx, &source, &event).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&ctx.config),
            ConfigAction::Validate => commands::config::validate(&ctx.config),
            ConfigAction::Path => {
                commands::config::path(&ctx.path);
                Ok(())
            }
        },
    }
}
