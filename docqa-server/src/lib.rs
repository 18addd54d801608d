//! `docqa-server` exposes a [`docqa_rag::RagService`] over HTTP and provides
//! the `docqa` command-line launcher.

pub mod bootstrap;
pub mod server;
pub mod settings;

pub use bootstrap::{build_service, read_text_document};
pub use server::{AppState, ApiError, app_router, run_server};
pub use settings::{EmbedderKind, GeneratorKind, IndexBackend, Settings};
