//
// backend.rs
//
// tower-lsp surface. Lifecycle, document sync, and the debounced
// diagnostics scheduler; all metadata questions are answered by handlers
// over the repository contract.
//

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};

use crate::handlers;
use crate::state::SessionState;

/// Collapse edit bursts before recomputing diagnostics.
const DIAGNOSTICS_DEBOUNCE: Duration = Duration::from_millis(500);

pub struct Backend {
    client: Client,
    session: Arc<RwLock<Option<Arc<SessionState>>>>,
    /// Root and PHP override captured at initialize, consumed at initialized.
    pending_init: Mutex<Option<(PathBuf, Option<PathBuf>)>>,
    /// In-flight diagnostic passes; a newer edit aborts the older pass.
    pending_diagnostics: Mutex<HashMap<Url, tokio::task::JoinHandle<()>>>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            session: Arc::new(RwLock::new(None)),
            pending_init: Mutex::new(None),
            pending_diagnostics: Mutex::new(HashMap::new()),
        }
    }

    async fn current_session(&self) -> Option<Arc<SessionState>> {
        self.session.read().await.clone()
    }

    /// Schedule a diagnostics pass for `uri`, discarding any pass already
    /// pending for it. Timer-based cancellation: superseded passes are
    /// aborted, never merged.
    fn schedule_diagnostics(&self, uri: Url) {
        let client = self.client.clone();
        let session = Arc::clone(&self.session);
        let task_uri = uri.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(DIAGNOSTICS_DEBOUNCE).await;
            let state = {
                let guard = session.read().await;
                guard.clone()
            };
            let Some(state) = state else {
                return;
            };
            let diags = handlers::diagnostics(&state, &task_uri);
            client.publish_diagnostics(task_uri, diags, None).await;
        });

        let mut pending = self
            .pending_diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.insert(uri, handle) {
            previous.abort();
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = params
            .root_uri
            .as_ref()
            .and_then(|uri| uri.to_file_path().ok())
            .or_else(|| {
                params
                    .workspace_folders
                    .as_ref()
                    .and_then(|folders| folders.first())
                    .and_then(|folder| folder.uri.to_file_path().ok())
            })
            .unwrap_or_else(|| PathBuf::from("."));

        let php_override = params
            .initialization_options
            .as_ref()
            .and_then(|options| options.get("phpPath"))
            .and_then(|value| value.as_str())
            .map(PathBuf::from);

        *self.pending_init.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((root, php_override));

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "lantern".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(
                        ["'", "\"", ".", "-", ":", "@", "<", "/"]
                            .iter()
                            .map(|s| s.to_string())
                            .collect(),
                    ),
                    ..CompletionOptions::default()
                }),
                definition_provider: Some(OneOf::Left(true)),
                ..ServerCapabilities::default()
            },
        })
    }

    async fn initialized(&self, _params: InitializedParams) {
        let Some((root, php_override)) = self
            .pending_init
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        else {
            return;
        };

        let state = SessionState::initialize(root, php_override).await;
        *self.session.write().await = Some(Arc::clone(&state));

        if !state.is_active() {
            log::info!("Workspace is not a Laravel project; serving empty results");
            return;
        }

        state.start_watcher();

        // Initial loads run concurrently; none blocks another.
        let load_state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Some(repos) = &load_state.repos {
                repos.load_all().await;
            }
            log::info!("Initial metadata loads complete");
        });
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(state) = self.current_session().await {
            state.watcher.dispose();
        }
        log::info!("lantern shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(state) = self.current_session().await {
            state.documents.open(
                uri.clone(),
                &params.text_document.text,
                Some(params.text_document.version),
            );
            self.schedule_diagnostics(uri);
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(state) = self.current_session().await {
            state.documents.apply_changes(
                &uri,
                Some(params.text_document.version),
                params.content_changes,
            );
            self.schedule_diagnostics(uri);
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(state) = self.current_session().await {
            state.documents.close(&uri);
        }
        let pending = self
            .pending_diagnostics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&uri);
        if let Some(handle) = pending {
            handle.abort();
        }
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        // Editor-reported batches funnel into the same classification
        // logic as native filesystem events.
        let Some(state) = self.current_session().await else {
            return;
        };
        for event in params.changes {
            if let Ok(path) = event.uri.to_file_path() {
                state.handle_file_change(path);
            }
        }
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let Some(state) = self.current_session().await else {
            return Ok(None);
        };
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        Ok(handlers::completion(&state, &uri, position))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let Some(state) = self.current_session().await else {
            return Ok(None);
        };
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        Ok(handlers::definition(&state, &uri, position).map(GotoDefinitionResponse::Scalar))
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    let (service, socket) = LspService::new(Backend::new);
    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
