use crate::RobotId;
use serde::{Deserialize, Serialize};

/// A bitfield of up to eight groups.
///
/// A command mask of zero addresses every robot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupMask(pub u8);

impl GroupMask {
    pub const ALL: GroupMask = GroupMask(0);

    /// The mask containing only `group`, or `None` past the eighth group.
    pub fn group(group: u8) -> Option<Self> {
        (group < 8).then(|| Self(1 << group))
    }

    pub fn is_all(self) -> bool {
        self.0 == 0
    }

    /// Whether a robot assigned to `self` is addressed by a command carrying `command`.
    pub fn matches(self, command: GroupMask) -> bool {
        command.is_all() || self.0 & command.0 != 0
    }
}

/// Group membership of every robot, indexed by [`RobotId`].
#[derive(Clone, Debug, Default)]
pub struct GroupMaskRegistry {
    masks: Vec<GroupMask>,
}

impl GroupMaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next robot and return its id.
    pub fn register(&mut self, mask: GroupMask) -> RobotId {
        self.masks.push(mask);
        RobotId(self.masks.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn mask(&self, id: RobotId) -> Option<GroupMask> {
        self.masks.get(id.0).copied()
    }

    /// Replace the whole mask of a robot. Unknown ids are ignored.
    pub fn assign(&mut self, id: RobotId, mask: GroupMask) {
        if let Some(slot) = self.masks.get_mut(id.0) {
            *slot = mask;
        }
    }

    /// Add a robot to `group`. Unknown ids and groups past 7 are ignored.
    pub fn join(&mut self, id: RobotId, group: u8) {
        if let (Some(slot), Some(bit)) = (self.masks.get_mut(id.0), GroupMask::group(group)) {
            slot.0 |= bit.0;
        }
    }

    pub fn leave(&mut self, id: RobotId, group: u8) {
        if let (Some(slot), Some(bit)) = (self.masks.get_mut(id.0), GroupMask::group(group)) {
            slot.0 &= !bit.0;
        }
    }

    pub fn matches(&self, id: RobotId, command: GroupMask) -> bool {
        self.mask(id).map_or(false, |mask| mask.matches(command))
    }

    /// Every robot addressed by `command`, in id order.
    pub fn members(&self, command: GroupMask) -> impl Iterator<Item = RobotId> + '_ {
        self.masks
            .iter()
            .enumerate()
            .filter(move |(_, mask)| mask.matches(command))
            .map(|(index, _)| RobotId(index))
    }
}
