//! Common utilities for integration tests

#![allow(dead_code)]

pub mod cli;

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Fixture used by most tests: two loaded projects sharing one header, an
/// unloaded project and a GUID-named virtual folder
pub const ENGINE_FIXTURE: &str = r#"
name = "Engine"

[[items]]
name = "{8BC9CEB8-8B4A-11D0-8D11-00A0C91BC942}"

[[items.items]]
name = "hidden.h"
path = "/src/hidden.h"

[[projects]]
name = "Core"
path = "/src/core/core.proj"

[[projects.items]]
name = "core.h"
path = "/src/core/core.h"

[[projects.items]]
name = "shared.h"
path = "/src/common/shared.h"

[[projects.items]]
name = "notes.txt"
path = "/src/core/notes.txt"

[[projects.items]]
name = "External Dependencies"

[[projects.items.items]]
name = "vector"
path = "/usr/include/c++/vector"

[[projects]]
name = "Game"
path = "/src/game/game.proj"

[[projects.items]]
name = "Source Files"

[[projects.items.items]]
name = "main.cpp"
path = "/src/game/main.cpp"

[[projects.items.items]]
name = "shared.h"
path = "/src/common/shared.h"

[[projects]]
name = "Tools"
path = "/src/tools/tools.proj"
loaded = false
"#;

/// Scratch directory holding a fixture and (optionally) a config file
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new(fixture: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tree.toml"), fixture).unwrap();
        Self { dir }
    }

    pub fn with_config(self, config: &str) -> Self {
        fs::write(self.dir.path().join("treesync.toml"), config).unwrap();
        self
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}
