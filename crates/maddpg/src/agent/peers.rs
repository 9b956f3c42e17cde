//! Read-only views of peer agents.

use crate::memory::TransitionStore;
use crate::policy::PolicyModel;
use crate::{MaddpgError, Result};

/// What an updating agent may read from a peer.
///
/// Borrowed immutably for the duration of one `update` call.
pub struct PeerView<'a, P: PolicyModel> {
    pub index: usize,
    /// Live policy, read for opponent-model diagnostics and architecture cloning
    pub policy: &'a P,
    pub target_policy: &'a P,
    pub store: &'a TransitionStore,
}

impl<P: PolicyModel> Clone for PeerView<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P: PolicyModel> Copy for PeerView<'_, P> {}

/// Every peer of one agent, indexed by agent index.
pub struct PeerSet<'a, P: PolicyModel> {
    slots: Vec<Option<PeerView<'a, P>>>,
}

impl<'a, P: PolicyModel> PeerSet<'a, P> {
    /// Validate that `views` covers exactly the indices other than `own`.
    pub fn new(own: usize, num_agents: usize, views: &[PeerView<'a, P>]) -> Result<Self> {
        let mut slots: Vec<Option<PeerView<'a, P>>> = vec![None; num_agents];
        for view in views {
            if view.index == own {
                return Err(MaddpgError::PeerMismatch(format!(
                    "agent {} listed as its own peer",
                    own
                )));
            }
            match slots.get_mut(view.index) {
                None => {
                    return Err(MaddpgError::PeerMismatch(format!(
                        "peer index {} out of range for {} agents",
                        view.index, num_agents
                    )))
                }
                Some(slot) if slot.is_some() => {
                    return Err(MaddpgError::PeerMismatch(format!(
                        "agent {} listed twice",
                        view.index
                    )))
                }
                Some(slot) => *slot = Some(*view),
            }
        }
        let missing: Vec<usize> = (0..num_agents)
            .filter(|&i| i != own && slots[i].is_none())
            .collect();
        if !missing.is_empty() {
            return Err(MaddpgError::PeerMismatch(format!(
                "missing peers {:?}",
                missing
            )));
        }
        Ok(Self { slots })
    }

    pub fn num_agents(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, index: usize) -> Result<&PeerView<'a, P>> {
        self.slots
            .get(index)
            .and_then(Option::as_ref)
            .ok_or_else(|| MaddpgError::PeerMismatch(format!("agent {} is not a peer", index)))
    }

    /// Peers in index order
    pub fn iter(&self) -> impl Iterator<Item = &PeerView<'a, P>> {
        self.slots.iter().flatten()
    }

    /// All stores in agent order, with `own_store` at the own index.
    pub fn stores<'s>(&'s self, own_store: &'s TransitionStore) -> Vec<&'s TransitionStore> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Some(view) => view.store,
                None => own_store,
            })
            .collect()
    }

    /// Action component sizes in agent order, with `own_split` at the own index.
    pub fn action_splits(&self, own_split: Vec<i64>) -> Vec<Vec<i64>> {
        let mut own_split = Some(own_split);
        self.slots
            .iter()
            .map(|slot| match slot {
                Some(view) => view.policy.action_split(),
                None => own_split.take().unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{MlpActor, MlpConfig};
    use tch::Device;

    fn actor() -> MlpActor {
        MlpActor::discrete(2, &[3], MlpConfig::default(), Device::Cpu)
    }

    #[test]
    fn test_peer_set_validation() {
        let (p, t) = (actor(), actor());
        let store = TransitionStore::new(4);
        let view = |index| PeerView {
            index,
            policy: &p,
            target_policy: &t,
            store: &store,
        };

        let set = PeerSet::new(1, 3, &[view(0), view(2)]).unwrap();
        assert_eq!(set.iter().map(|v| v.index).collect::<Vec<_>>(), vec![0, 2]);
        assert!(set.get(1).is_err());
        assert_eq!(set.stores(&store).len(), 3);

        assert!(PeerSet::new(1, 3, &[view(0)]).is_err());
        assert!(PeerSet::new(1, 3, &[view(0), view(1), view(2)]).is_err());
        assert!(PeerSet::new(1, 3, &[view(0), view(0), view(2)]).is_err());
        assert!(PeerSet::new(1, 3, &[view(0), view(5)]).is_err());
    }
}
