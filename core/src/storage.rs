use crate::block::Block;
use crate::error::CoreError;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory under which per-node chain snapshots are persisted (§6).
pub const STATE_DIR: &str = "blockchain_states";

/// On-disk representation of a node's chain: just the block list, written
/// as one JSON document (§4.5).
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct PersistedChain {
    blocks: Vec<Block>,
}

/// Filesystem path for a node identified by `host:port`, e.g.
/// `blockchain_states/127.0.0.1_5501.json`.
pub fn state_path(dir: &Path, host: &str, port: u16) -> PathBuf {
    let filename = format!("{}_{}.json", host.replace(':', "_"), port);
    dir.join(filename)
}

/// Loads a chain's block list from `path`. Returns `Ok(None)` if the file
/// does not exist or its contents are corrupt — both cases the caller
/// treats identically: fall back to a fresh genesis (§4.5, §7).
pub fn load(path: &Path) -> Option<Vec<Block>> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str::<PersistedChain>(&raw) {
        Ok(persisted) => Some(persisted.blocks),
        Err(err) => {
            log::warn!("persisted chain at {:?} is corrupt, starting from genesis: {}", path, err);
            None
        }
    }
}

/// Atomically writes `blocks` to `path`: serialize to a temp file in the
/// same directory, then rename over the target so readers never observe a
/// half-written file (§4.5).
pub fn save(path: &Path, blocks: &[Block]) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let persisted = PersistedChain { blocks: blocks.to_vec() };
    let json = serde_json::to_string_pretty(&persisted)?;

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn tmp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("storychain-core-test-{}", std::process::id()));
        dir
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tmp_dir();
        let _ = fs::remove_dir_all(&dir);
        let path = state_path(&dir, "127.0.0.1", 5501);

        let blocks = vec![Block::genesis(1)];
        save(&path, &blocks).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, blocks);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = tmp_dir();
        let _ = fs::remove_dir_all(&dir);
        let path = state_path(&dir, "127.0.0.1", 5999);
        assert!(load(&path).is_none());
    }

    #[test]
    fn load_corrupt_file_returns_none() {
        let dir = tmp_dir();
        fs::create_dir_all(&dir).unwrap();
        let path = state_path(&dir, "127.0.0.1", 6000);
        fs::write(&path, b"not json").unwrap();
        assert!(load(&path).is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
