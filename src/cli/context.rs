//! Per-invocation context.
//!
//! One value constructed at dispatch time and threaded through every
//! operation: the git facade, the stack manager bound to this repository's
//! store, and user settings.

use crate::errors::Result;
use crate::forge::{detect_forge, Forge};
use crate::git::GitRepository;
use crate::settings::Settings;
use crate::stack::{Stack, StackManager};
use tracing::debug;

pub struct Context {
    pub git: GitRepository,
    pub manager: StackManager,
    pub settings: Settings,
}

impl Context {
    /// Build a context for the repository containing the current directory.
    pub fn discover() -> Result<Self> {
        let git = GitRepository::discover()?;
        let git_dir = git.git_dir()?;
        Ok(Self {
            git,
            manager: StackManager::new(git_dir),
            settings: Settings::load(),
        })
    }

    pub fn new(git: GitRepository, manager: StackManager, settings: Settings) -> Self {
        Self {
            git,
            manager,
            settings,
        }
    }

    /// Load the current stack or fail pointing at `init`/`switch`.
    pub fn require_stack(&self) -> Result<Stack> {
        self.manager.load_current()
    }

    pub fn require_clean_tree(&self) -> Result<()> {
        self.git.ensure_clean()
    }

    pub fn remote(&self) -> &str {
        &self.settings.git.remote
    }

    /// Detect the forge provider behind the configured remote.
    pub fn forge(&self) -> Result<Box<dyn Forge>> {
        let url = self.git.remote_url(self.remote())?;
        let forge = detect_forge(&url, &self.settings)?;
        debug!("using {} provider for {url}", forge.name());
        Ok(forge)
    }
}
