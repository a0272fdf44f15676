//! Persistence of the newest chain state.

use crate::chain_state::ChainState;
use crate::StateError;
use store::KeyedStore;
use tracing::debug;

/// Key under which the newest chain state is kept.
const STATE_KEY: &str = "s/state";

/// Keeps exactly one version of the chain state: the newest.
pub struct ChainStateStore<S: KeyedStore> {
    store: S,
}

impl<S: KeyedStore> ChainStateStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load the persisted state, if any.
    pub fn load(&self) -> Result<Option<ChainState>, StateError> {
        match self.store.get_opt(STATE_KEY)? {
            Some(data) => {
                let state: ChainState = bincode::deserialize(&data)
                    .map_err(|e| StateError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Persist `state`, replacing the previous version.
    ///
    /// Refuses to replace a state of another chain, or one that is ahead in block
    /// height or DA height.
    pub fn save(&self, state: &ChainState) -> Result<(), StateError> {
        self.write(state, true)
    }

    /// Persist `state` after its DA cursor was restarted for a DA layer that kept
    /// no history. Chain id and block height are still checked.
    pub fn save_after_da_restart(&self, state: &ChainState) -> Result<(), StateError> {
        self.write(state, false)
    }

    fn write(&self, state: &ChainState, check_da_height: bool) -> Result<(), StateError> {
        if let Some(previous) = self.load()? {
            if previous.chain_id != state.chain_id {
                return Err(StateError::WrongChainId {
                    expected: previous.chain_id,
                    got: state.chain_id.clone(),
                });
            }
            if state.last_block_height < previous.last_block_height {
                return Err(StateError::HeightRegression {
                    persisted: previous.last_block_height,
                    got: state.last_block_height,
                });
            }
            if check_da_height && state.da_height < previous.da_height {
                return Err(StateError::DaHeightRegression {
                    current: previous.da_height,
                    got: state.da_height,
                });
            }
        }

        let data =
            bincode::serialize(state).map_err(|e| StateError::Serialization(e.to_string()))?;
        self.store.put(STATE_KEY, &data)?;
        debug!(
            "Saved chain state: height={}, da_height={}",
            state.last_block_height, state.da_height
        );
        Ok(())
    }

    /// Access the underlying store.
    pub fn inner(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_state::ExecutionOutcome;
    use crate::genesis::GenesisDoc;
    use block_schema::Block;
    use store::SledStore;

    fn genesis_state() -> ChainState {
        ChainState::from_genesis(&GenesisDoc::new("rollup-1").with_validator(b"v".to_vec(), 1))
            .unwrap()
    }

    fn next(state: &ChainState) -> ChainState {
        let block = Block::new(
            state.chain_id.clone(),
            state.next_height(),
            0,
            state.last_block_id.hash,
            vec![],
        );
        state
            .apply_block(&block, ExecutionOutcome::default())
            .unwrap()
    }

    #[test]
    fn test_save_load() {
        let store = ChainStateStore::new(SledStore::in_memory("state").unwrap());
        assert!(store.load().unwrap().is_none());

        let state = genesis_state();
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap(), Some(state.clone()));

        let s1 = next(&state);
        store.save(&s1).unwrap();
        assert_eq!(store.load().unwrap(), Some(s1));
        // only the newest version is kept
        assert_eq!(store.inner().len(), 1);
    }

    #[test]
    fn test_refuses_regressions() {
        let store = ChainStateStore::new(SledStore::in_memory("state").unwrap());
        let s0 = genesis_state();
        let mut s1 = next(&s0);
        s1.advance_da_height(5).unwrap();
        store.save(&s1).unwrap();

        assert!(matches!(
            store.save(&s0),
            Err(StateError::HeightRegression { .. })
        ));

        let mut behind = s1.clone();
        behind.da_height = 4;
        assert!(matches!(
            store.save(&behind),
            Err(StateError::DaHeightRegression { current: 5, got: 4 })
        ));

        let mut foreign = s1.clone();
        foreign.chain_id = "other".to_string();
        assert!(matches!(
            store.save(&foreign),
            Err(StateError::WrongChainId { .. })
        ));

        assert_eq!(store.load().unwrap(), Some(s1));
    }

    #[test]
    fn test_save_after_da_restart() {
        let store = ChainStateStore::new(SledStore::in_memory("state").unwrap());
        let s0 = genesis_state();
        let mut s1 = next(&s0);
        s1.advance_da_height(8).unwrap();
        store.save(&s1).unwrap();

        let mut restarted = s1.clone();
        restarted.restart_da_height(1);
        store.save_after_da_restart(&restarted).unwrap();
        assert_eq!(store.load().unwrap().unwrap().da_height, 1);

        // block height is still guarded
        assert!(matches!(
            store.save_after_da_restart(&s0),
            Err(StateError::HeightRegression { .. })
        ));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = next(&genesis_state());
        {
            let store = ChainStateStore::new(SledStore::open(dir.path(), "state").unwrap());
            store.save(&state).unwrap();
            store.inner().flush().unwrap();
        }
        let store = ChainStateStore::new(SledStore::open(dir.path(), "state").unwrap());
        assert_eq!(store.load().unwrap(), Some(state));
    }
}
