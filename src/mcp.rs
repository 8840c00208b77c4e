//! MCP server implementation using rmcp.
//!
//! Exposes the execution service as a single `execute` tool, for MCP
//! clients that want to run code the same way the editor does.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{error, info};

use crate::executor::{ExecuteError, ExecutionResult, Executor};

/// MCP server wrapping an [`Executor`].
#[derive(Clone)]
pub struct ExecutionServer {
    executor: Arc<Executor>,
    tool_router: ToolRouter<Self>,
}

/// Parameters for the execute tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteParams {
    /// Language tag: "cpp", "java", "js" or "python".
    #[schemars(description = "Language of the code: 'cpp', 'java', 'js' or 'python'")]
    pub language: String,

    /// The source code to run.
    #[schemars(description = "The complete source file to run")]
    pub code: String,
}

/// Render a successful run as tool output text.
fn render(result: ExecutionResult) -> String {
    match result.error {
        Some(stderr) => format!("{}\n--- stderr ---\n{stderr}", result.output),
        None => result.output,
    }
}

#[tool_router]
impl ExecutionServer {
    pub fn new(executor: Arc<Executor>) -> Self {
        Self {
            executor,
            tool_router: Self::tool_router(),
        }
    }

    /// Run code in a disposable container for its language.
    #[tool(description = "Compile and run a single source file in a container (cpp, java, js, python)")]
    async fn execute(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.executor.execute(&params.language, &params.code).await {
            Ok(result) => Ok(CallToolResult::success(vec![Content::text(render(result))])),
            Err(ExecuteError::UnsupportedLanguage(e)) => {
                let available: Vec<_> = self.executor.languages();
                Err(McpError::invalid_params(
                    format!("Unknown language: '{}'. Available: {available:?}", e.0),
                    None,
                ))
            }
            Err(e) => {
                error!(error = %e, "Execution failed");
                Ok(CallToolResult::error(vec![Content::text(format!(
                    "Execution error: {}",
                    e.details()
                ))]))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for ExecutionServer {
    fn get_info(&self) -> ServerInfo {
        let languages = self.executor.languages();

        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "compilespace".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Run single-file programs in per-language containers.\n\
                 Supported languages: {languages:?}\n\
                 \n\
                 Use the 'execute' tool with:\n\
                 - language: one of cpp, java, js, python\n\
                 - code: the complete source file"
            )),
        }
    }
}

/// Serve the execution tool over stdio.
pub async fn serve_stdio(executor: Arc<Executor>) -> anyhow::Result<()> {
    let server = ExecutionServer::new(executor);

    info!("Starting MCP server on stdio");

    let service = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}
