use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::environment::{Environment, LocalEnvironment};

/// Where a tournament's game and player codebases live.
pub trait Workspace {
    /// The environment game commands run in.
    fn game_environment(&self) -> Arc<dyn Environment>;

    /// A player's codebase, as the game sees it, and the environment the
    /// player's agent works in.
    fn player_workspace(&self, player: &str) -> (PathBuf, Arc<dyn Environment>);
}

/// Directories on the local filesystem: `<root>/game` for the game and
/// `<root>/<player>` for every player.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalWorkspace { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Workspace for LocalWorkspace {
    fn game_environment(&self) -> Arc<dyn Environment> {
        Arc::new(LocalEnvironment::new(self.root.join("game")))
    }

    fn player_workspace(&self, player: &str) -> (PathBuf, Arc<dyn Environment>) {
        let codebase = self.root.join(player);
        let env: Arc<dyn Environment> = Arc::new(LocalEnvironment::new(codebase.clone()));
        (codebase, env)
    }
}

/// A single environment shared by the game and every player, with player
/// codebases at `/<player>`. This is the layout of a single container.
#[derive(Clone)]
pub struct SharedWorkspace {
    environment: Arc<dyn Environment>,
}

impl SharedWorkspace {
    pub fn new(environment: Arc<dyn Environment>) -> Self {
        SharedWorkspace { environment }
    }
}

impl Workspace for SharedWorkspace {
    fn game_environment(&self) -> Arc<dyn Environment> {
        self.environment.clone()
    }

    fn player_workspace(&self, player: &str) -> (PathBuf, Arc<dyn Environment>) {
        (PathBuf::from("/").join(player), self.environment.clone())
    }
}
