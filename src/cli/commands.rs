//! CLI command implementations.
//!
//! Contains the business logic for each CLI command. All human-facing
//! output goes through a locked stdout handle; stderr carries logs.

use std::io::{self, Write as IoWrite};
use std::sync::Arc;

use crate::config::Config;
use crate::dreaming::{DreamingPipeline, QualityLevel};
use crate::error::Error;
use crate::llm::{LlmConfig, OpenAiClient};
use crate::memory::MemoryOrchestrator;
use crate::search::WebSearchClient;
use crate::server::{HttpState, McpService, serve_http, serve_stdio};
use crate::tools::{ToolExecutor, ToolRegistry};

use super::parser::{Cli, Commands, DreamCommands};

/// Executes the parsed CLI command.
///
/// # Errors
///
/// Returns [`Error`] on configuration, transport, or pipeline failure.
pub async fn execute(cli: Cli) -> Result<(), Error> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ServeStdio => {
            let service = build_service(&config);
            serve_stdio(service).await?;
            Ok(())
        }
        Commands::ServeHttp { host, port } => {
            let service = build_service(&config);
            let state = HttpState::new(
                service,
                config.server.require_auth,
                config.server.api_key.clone(),
            );
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            serve_http(state, &host, port).await?;
            Ok(())
        }
        Commands::Dream(command) => run_dream(&config, command).await,
        Commands::Tools {
            templates,
            by_category,
        } => {
            let service = build_service(&config);
            let registry = service.registry();
            let listing = if by_category {
                serde_json::to_value(registry.by_category()).unwrap_or_default()
            } else if templates {
                serde_json::to_value(registry.list_tools_with_templates()).unwrap_or_default()
            } else {
                serde_json::to_value(registry.list_tools()).unwrap_or_default()
            };
            print_json(&listing)
        }
        Commands::Status => {
            let memory = MemoryOrchestrator::from_config(&config);
            print_json(&memory.memory_stats())
        }
    }
}

/// Wires the full service stack from configuration.
fn build_service(config: &Config) -> Arc<McpService> {
    let memory = MemoryOrchestrator::from_config(config);
    let web = WebSearchClient::new(&config.web_search);
    let executor = Arc::new(ToolExecutor::new(memory, web, config.server.require_auth));
    Arc::new(McpService::new(Arc::new(ToolRegistry::new(executor))))
}

/// Builds the dreaming pipeline from configuration and environment.
fn build_pipeline(config: &Config, quality: Option<&str>) -> Result<DreamingPipeline, Error> {
    let llm_config = LlmConfig::from_env()?;
    Ok(pipeline_with(config, quality, &llm_config))
}

/// Pipeline for read-only archive inspection: no LLM call will be made,
/// so a missing API key must not block reads.
fn build_pipeline_readonly(config: &Config) -> DreamingPipeline {
    let llm_config = LlmConfig::from_env().unwrap_or_else(|_| LlmConfig {
        api_key: String::new(),
        base_url: None,
        model: "unconfigured".to_string(),
        max_tokens: 1,
        temperature: 0.0,
    });
    pipeline_with(config, None, &llm_config)
}

fn pipeline_with(config: &Config, quality: Option<&str>, llm_config: &LlmConfig) -> DreamingPipeline {
    let llm = Arc::new(OpenAiClient::new(llm_config));
    let quality = quality.map_or_else(
        || QualityLevel::parse(&config.dreaming.quality_level),
        QualityLevel::parse,
    );
    DreamingPipeline::new(llm, quality, config.data_dir.join("dreams"))
}

async fn run_dream(config: &Config, command: DreamCommands) -> Result<(), Error> {
    match command {
        DreamCommands::Process {
            conversation_id,
            file,
            quality,
        } => {
            let text = std::fs::read_to_string(&file)?;
            let pipeline = build_pipeline(config, quality.as_deref())?;
            let outcome = pipeline
                .process_conversation(&conversation_id, &text, serde_json::json!({}))
                .await?;
            print_json(&serde_json::to_value(&outcome).unwrap_or_default())
        }
        DreamCommands::Upgrade {
            conversation_id,
            quality,
        } => {
            let pipeline = build_pipeline(config, None)?;
            let outcome = pipeline
                .upgrade_quality(&conversation_id, QualityLevel::parse(&quality))
                .await?;
            print_json(&serde_json::to_value(&outcome).unwrap_or_default())
        }
        DreamCommands::Show {
            conversation_id,
            version,
        } => {
            let pipeline = build_pipeline_readonly(config);
            let archive = pipeline.get_archive(&conversation_id, version)?;
            print_json(&archive)
        }
        DreamCommands::Manifest { conversation_id } => {
            let pipeline = build_pipeline_readonly(config);
            let manifest = pipeline.get_manifest(&conversation_id).ok_or_else(|| {
                crate::error::DreamError::ArchiveNotFound {
                    conversation_id: conversation_id.clone(),
                }
            })?;
            print_json(&serde_json::to_value(&manifest).unwrap_or_default())
        }
        DreamCommands::List => {
            let pipeline = build_pipeline_readonly(config);
            print_json(&serde_json::Value::Array(pipeline.list_archives()))
        }
    }
}

/// Pretty-prints a JSON value to stdout.
fn print_json(value: &serde_json::Value) -> Result<(), Error> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let rendered = serde_json::to_string_pretty(value).unwrap_or_default();
    writeln!(handle, "{rendered}").map_err(Error::Io)?;
    Ok(())
}
