//! Collaborator wiring shared by the commands

use std::sync::Arc;

use mcpscout_config::{Config, RepositoryBackend};
use mcpscout_engine::{CheckpointState, Collaborators};
use mcpscout_research::backend_from_config;
use mcpscout_store::{
    FileScheduler, FsCheckpointStore, FsObjectStore, GitHubContentsStore, LocalVersionedStore,
    VersionedFileStore,
};
use mcpscout_utils::error::{ConfigError, ScoutError};

/// Checkpoint markers and continuations under the configured state directory
pub fn checkpoint_state(config: &Config) -> CheckpointState {
    let state_dir = config.state_dir();
    CheckpointState::new(
        Arc::new(FsCheckpointStore::new(state_dir.clone())),
        Arc::new(FileScheduler::new(&state_dir)),
    )
}

/// Every collaborator a `run` needs.
///
/// Fails on missing credentials before anything is read or written.
pub fn build_collaborators(config: &Config) -> Result<Collaborators, ScoutError> {
    let repo = &config.repository;
    let files: Arc<dyn VersionedFileStore> = match repo.backend {
        RepositoryBackend::Local => Arc::new(LocalVersionedStore::new(
            config.resolve_path(&repo.local_root),
        )),
        RepositoryBackend::Github => Arc::new(GitHubContentsStore::new(
            repo.api_base.clone(),
            repo.owner.clone().unwrap_or_default(),
            repo.name.clone().unwrap_or_default(),
            repo.branch.clone(),
            Config::secret_from_env(&repo.token_env)?,
        )?),
    };

    let state_dir = config.state_dir();
    Ok(Collaborators {
        objects: Arc::new(FsObjectStore::new(config.resolve_path(&config.objects.root))),
        files,
        checkpoints: Arc::new(FsCheckpointStore::new(state_dir.clone())),
        scheduler: Arc::new(FileScheduler::new(&state_dir)),
        research: Arc::from(backend_from_config(config)?),
    })
}

/// Read the research rules text named by `files.rules`
pub fn read_rules(config: &Config) -> Result<String, ScoutError> {
    let path = config.resolve_path(&config.files.rules);
    match std::fs::read_to_string(&path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::MissingRequired(
            format!("research rules file {path} does not exist"),
        )
        .into()),
        Err(e) => Err(ScoutError::Io(e)),
    }
}
